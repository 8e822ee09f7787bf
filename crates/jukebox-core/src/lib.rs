//! Per-group audio queue and playback controller.
//!
//! ## Layout
//! - [`engine`]: the playback state machine (queue, connection, dispatcher, idle timeout).
//! - [`actor`]: one tokio task per engine that serializes commands and dispatcher events.
//! - [`registry`]: group id to engine lookup with spawn-on-demand and eviction.
//! - [`transport`]: the voice connector/connection/dispatcher traits the engine drives.
//! - [`local_voice`]: a thread-per-stream transport that plays to nowhere.
//!
//! Callers resolve tracks and parse commands themselves; the engine only consumes
//! already-parsed operations and reports through [`transport::StatusSink`]s.

pub mod actor;
pub mod config;
pub mod engine;
pub mod events;
pub mod local_voice;
pub mod messages;
pub mod queue;
pub mod registry;
pub mod track;
pub mod transport;

#[cfg(test)]
mod testing;

pub use actor::{Control, EngineCommand, EngineHandle, spawn_engine};
pub use config::{PlayerConfig, ResolvedConfig};
pub use engine::{EngineSnapshot, PlaybackEngine};
pub use events::{EventBus, PlayerEvent};
pub use registry::EngineRegistry;
pub use track::{FileSource, MemorySource, StreamSource, Track};
pub use transport::{StatusSink, VoiceChannel, VoiceConnector};

pub use jukebox_types::{EndReason, EngineStatus, NowPlaying, StatusMessage, TrackInfo};
