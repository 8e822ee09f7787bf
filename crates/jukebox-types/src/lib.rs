use serde::{Deserialize, Serialize};

/// Lifecycle state of one playback engine.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    /// No voice connection.
    #[default]
    Offline,
    /// Connected, nothing streaming.
    Stopped,
    /// A dispatcher is streaming.
    Playing,
    /// A dispatcher exists but is paused.
    Paused,
}

impl EngineStatus {
    /// `true` when a dispatcher must exist for this status.
    pub fn is_streaming(self) -> bool {
        matches!(self, EngineStatus::Playing | EngineStatus::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngineStatus::Offline => "offline",
            EngineStatus::Stopped => "stopped",
            EngineStatus::Playing => "playing",
            EngineStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a dispatcher session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Natural end of stream, or a skip. The queue auto-advances.
    Finished,
    /// Forced stop because the voice connection is being torn down. No auto-advance.
    Leave,
}

/// Display metadata for a playable item.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackInfo {
    /// Human readable title.
    pub title: String,
    /// Source locator (URL or path).
    pub url: String,
    /// Formatted duration, e.g. `3:07`.
    pub duration: String,
    /// Display name of whoever requested the track.
    pub requester: String,
    /// Optional artwork locator.
    pub thumbnail: Option<String>,
}

/// Structured "now playing" record sent to the bound text sink.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub url: String,
    pub duration: String,
    pub requester: String,
    pub thumbnail: Option<String>,
    /// Unix timestamp (milliseconds) when the record was produced.
    pub timestamp_ms: i64,
}

impl NowPlaying {
    pub fn from_track(info: &TrackInfo, timestamp_ms: i64) -> Self {
        Self {
            title: info.title.clone(),
            url: info.url.clone(),
            duration: info.duration.clone(),
            requester: info.requester.clone(),
            thumbnail: info.thumbnail.clone(),
            timestamp_ms,
        }
    }
}

/// Outbound status. The engine defines content; sinks decide rendering.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusMessage {
    Text { text: String },
    NowPlaying(NowPlaying),
}

impl StatusMessage {
    pub fn text(text: impl Into<String>) -> Self {
        StatusMessage::Text { text: text.into() }
    }

    /// Plain text content, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StatusMessage::Text { text } => Some(text),
            StatusMessage::NowPlaying(_) => None,
        }
    }
}

/// Format whole seconds as `m:ss` or `h:mm:ss`.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Parse `ss`, `m:ss` or `h:mm:ss` back into seconds.
pub fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut total = 0u64;
    let mut parts = 0;
    for part in raw.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        let value: u64 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}
