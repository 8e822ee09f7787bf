//! Configuration loading and parsing.
//!
//! Defines the player config schema and resolves defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use jukebox_types::EngineStatus;

const DEFAULT_VOLUME_PERCENT: u8 = 100;
const DEFAULT_PAUSED_IDLE_SECS: u64 = 600;
const DEFAULT_IDLE_SECS: u64 = 120;
const DEFAULT_QUEUE_DISPLAY_LIMIT: usize = 15;
const DEFAULT_COMMAND_BUFFER: usize = 64;
const DEFAULT_CHUNK_BYTES: usize = 4096;

/// Top-level player configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerConfig {
    /// Initial volume for new engines, in percent.
    pub default_volume: Option<u8>,
    /// Idle timeout settings.
    pub idle: Option<IdleConfig>,
    /// Number of queue entries shown by a queue listing.
    pub queue_display_limit: Option<usize>,
    /// Announce tracks that fail mid-stream before skipping them.
    pub announce_track_errors: Option<bool>,
    /// Capacity of each engine's command channel.
    pub command_buffer: Option<usize>,
    /// Local voice transport settings.
    pub local_voice: Option<LocalVoiceConfig>,
}

/// Idle timeout config from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct IdleConfig {
    /// Timeout while paused.
    pub paused_secs: Option<u64>,
    /// Timeout for every other connected status.
    pub other_secs: Option<u64>,
    /// Let the engine actor enforce the timeout itself.
    pub disconnect: Option<bool>,
}

/// Local voice transport config from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct LocalVoiceConfig {
    /// Playback speed multiplier (2.0 plays a 3 minute track in 90 seconds).
    pub speed: Option<f64>,
    /// Bytes read from the audio stream per chunk.
    pub chunk_bytes: Option<usize>,
}

/// Idle timeouts keyed by engine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeouts {
    pub paused: Duration,
    pub other: Duration,
}

impl IdleTimeouts {
    /// Timeout that applies while the engine sits in `status`.
    pub fn for_status(&self, status: EngineStatus) -> Duration {
        match status {
            EngineStatus::Paused => self.paused,
            _ => self.other,
        }
    }
}

impl Default for IdleTimeouts {
    fn default() -> Self {
        Self {
            paused: Duration::from_secs(DEFAULT_PAUSED_IDLE_SECS),
            other: Duration::from_secs(DEFAULT_IDLE_SECS),
        }
    }
}

/// Player config with every default applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub default_volume: f32,
    pub idle: IdleTimeouts,
    pub idle_disconnect: bool,
    pub queue_display_limit: usize,
    pub announce_track_errors: bool,
    pub command_buffer: usize,
    pub local_voice: LocalVoiceSettings,
}

/// Resolved local voice settings.
#[derive(Debug, Clone, Copy)]
pub struct LocalVoiceSettings {
    pub speed: f64,
    pub chunk_bytes: usize,
}

impl Default for LocalVoiceSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        PlayerConfig::default().resolve()
    }
}

impl PlayerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(raw: &str) -> Result<Self> {
        let cfg = toml::from_str::<PlayerConfig>(raw)?;
        Ok(cfg)
    }

    /// Apply defaults and clamp out-of-range values.
    pub fn resolve(&self) -> ResolvedConfig {
        let volume = self
            .default_volume
            .unwrap_or(DEFAULT_VOLUME_PERCENT)
            .min(100);
        let idle = self.idle.as_ref();
        let defaults = IdleTimeouts::default();
        let local = self.local_voice.as_ref();
        let speed = local
            .and_then(|l| l.speed)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0);
        ResolvedConfig {
            default_volume: f32::from(volume) / 100.0,
            idle: IdleTimeouts {
                paused: idle
                    .and_then(|i| i.paused_secs)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.paused),
                other: idle
                    .and_then(|i| i.other_secs)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.other),
            },
            idle_disconnect: idle.and_then(|i| i.disconnect).unwrap_or(true),
            queue_display_limit: self
                .queue_display_limit
                .unwrap_or(DEFAULT_QUEUE_DISPLAY_LIMIT)
                .max(1),
            announce_track_errors: self.announce_track_errors.unwrap_or(false),
            command_buffer: self.command_buffer.unwrap_or(DEFAULT_COMMAND_BUFFER).max(1),
            local_voice: LocalVoiceSettings {
                speed,
                chunk_bytes: local
                    .and_then(|l| l.chunk_bytes)
                    .unwrap_or(DEFAULT_CHUNK_BYTES)
                    .max(1),
            },
        }
    }
}
