//! Voice transport abstraction.
//!
//! A connector joins a voice channel and yields a connection; a connection turns an
//! audio stream into a dispatcher. Dispatchers report lifecycle events through an
//! [`EventSink`] tagged with the generation the engine assigned to them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::Sender;
use tokio::sync::mpsc::UnboundedSender;

use jukebox_types::{EndReason, StatusMessage};

use crate::track::AudioStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The requester is not in a voice channel.
    NotInVoiceChannel,
    /// The connection or sink has gone away.
    Offline,
    /// Joining the voice channel failed.
    ConnectFailed(String),
    /// The connection refused to start a stream.
    StreamFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotInVoiceChannel => f.write_str("not in a voice channel"),
            TransportError::Offline => f.write_str("transport offline"),
            TransportError::ConnectFailed(msg) => write!(f, "connect failed: {msg}"),
            TransportError::StreamFailed(msg) => write!(f, "stream failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A voice channel the requester currently sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: String,
    pub name: String,
}

impl VoiceChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Options for a single stream playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    /// Linear volume scale, 0.0 to 1.0.
    pub volume: f32,
    /// Expected playback length, when known.
    pub duration_hint: Option<Duration>,
}

/// Lifecycle event emitted by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatcherEvent {
    /// Stream or output failure. The session is over.
    Error(String),
    /// The session ended.
    Ended(EndReason),
    /// Diagnostic chatter.
    Debug(String),
}

/// Dispatcher event tagged with its session generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSignal {
    pub generation: u64,
    pub event: DispatcherEvent,
}

/// Handle a dispatcher uses to report events back to its engine.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: UnboundedSender<DispatcherSignal>,
}

impl EventSink {
    pub fn new(generation: u64, tx: UnboundedSender<DispatcherSignal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: DispatcherEvent) {
        let _ = self.tx.send(DispatcherSignal {
            generation: self.generation,
            event,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(DispatcherEvent::Error(message.into()));
    }

    pub fn ended(&self, reason: EndReason) {
        self.emit(DispatcherEvent::Ended(reason));
    }

    pub fn debug(&self, info: impl Into<String>) {
        self.emit(DispatcherEvent::Debug(info.into()));
    }
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Join `channel` and return a live connection.
    async fn connect(
        &self,
        channel: &VoiceChannel,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;
}

pub trait VoiceConnection: Send {
    fn channel(&self) -> &VoiceChannel;
    /// Start streaming `stream`. Lifecycle events go to `events`.
    fn play_stream(
        &mut self,
        stream: AudioStream,
        options: StreamOptions,
        events: EventSink,
    ) -> Result<Box<dyn Dispatcher>, TransportError>;
    fn disconnect(&mut self);
}

/// One in-flight stream playback.
pub trait Dispatcher: Send {
    fn pause(&mut self);
    fn resume(&mut self);
    /// End the session; the transport reports `Ended(reason)` afterwards.
    fn end(&mut self, reason: EndReason);
    fn set_volume(&mut self, volume: f32);
}

/// Destination for user-visible status output.
pub trait StatusSink: Send + Sync {
    fn send(&self, message: StatusMessage) -> Result<(), TransportError>;
}

/// Discards everything.
pub struct NullSink;

impl StatusSink for NullSink {
    fn send(&self, _message: StatusMessage) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Status sink backed by a channel, drained by whoever renders the output.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<StatusMessage>,
}

impl ChannelSink {
    pub fn new(tx: Sender<StatusMessage>) -> Self {
        Self { tx }
    }
}

impl StatusSink for ChannelSink {
    fn send(&self, message: StatusMessage) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Offline)
    }
}
