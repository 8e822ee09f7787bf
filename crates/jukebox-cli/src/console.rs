//! Status sink that renders engine output on stdout.

use std::io::Write;

use jukebox_core::StatusSink;
use jukebox_core::transport::TransportError;
use jukebox_types::StatusMessage;

pub struct ConsoleSink {
    group: String,
    json: bool,
}

impl ConsoleSink {
    pub fn new(group: impl Into<String>, json: bool) -> Self {
        Self {
            group: group.into(),
            json,
        }
    }
}

/// Plain-text rendering of a status message, one or more lines.
pub fn render(message: &StatusMessage) -> String {
    match message {
        StatusMessage::Text { text } => text.clone(),
        StatusMessage::NowPlaying(np) => {
            let duration = if np.duration.is_empty() {
                String::new()
            } else {
                format!(" ({})", np.duration)
            };
            format!(
                ":notes: Now playing {} <{}>{} requested by {}",
                np.title, np.url, duration, np.requester
            )
        }
    }
}

impl StatusSink for ConsoleSink {
    fn send(&self, message: StatusMessage) -> Result<(), TransportError> {
        let rendered = if self.json {
            serde_json::to_string(&message).map_err(|_| TransportError::Offline)?
        } else {
            render(&message)
        };
        let mut out = std::io::stdout().lock();
        for line in rendered.lines() {
            writeln!(out, "[{}] {}", self.group, line).map_err(|_| TransportError::Offline)?;
        }
        Ok(())
    }
}
