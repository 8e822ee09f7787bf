//! In-process event bus for engine updates.
//!
//! Provides a lightweight broadcast channel for observers (logging, dashboards, tests).

use tokio::sync::broadcast;

use jukebox_types::EngineStatus;

/// Event payloads published by engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    StatusChanged {
        group: String,
        status: EngineStatus,
    },
    QueueChanged {
        group: String,
        len: usize,
    },
    TrackStarted {
        group: String,
        title: String,
    },
    TrackFailed {
        group: String,
        title: String,
        error: String,
    },
    EngineEvicted {
        group: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    pub fn status_changed(&self, group: &str, status: EngineStatus) {
        let _ = self.sender.send(PlayerEvent::StatusChanged {
            group: group.to_string(),
            status,
        });
    }

    pub fn queue_changed(&self, group: &str, len: usize) {
        let _ = self.sender.send(PlayerEvent::QueueChanged {
            group: group.to_string(),
            len,
        });
    }

    pub fn track_started(&self, group: &str, title: &str) {
        let _ = self.sender.send(PlayerEvent::TrackStarted {
            group: group.to_string(),
            title: title.to_string(),
        });
    }

    pub fn track_failed(&self, group: &str, title: &str, error: &str) {
        let _ = self.sender.send(PlayerEvent::TrackFailed {
            group: group.to_string(),
            title: title.to_string(),
            error: error.to_string(),
        });
    }

    pub fn engine_evicted(&self, group: &str) {
        let _ = self.sender.send(PlayerEvent::EngineEvicted {
            group: group.to_string(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
