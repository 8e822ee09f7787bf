//! User-visible status strings.

use std::fmt::{self, Write};

use jukebox_types::StatusMessage;

use crate::queue::TrackQueue;

fn wrap(value: impl fmt::Display) -> String {
    format!("`{value}`")
}

pub fn queue_complete() -> StatusMessage {
    StatusMessage::text("Queue complete.")
}

pub fn not_connected() -> StatusMessage {
    StatusMessage::text(format!(
        "Please call me with {} to start playing the queue.",
        wrap("join")
    ))
}

pub fn skipped(title: &str) -> StatusMessage {
    StatusMessage::text(format!(":fast_forward: Skipped {}", wrap(title)))
}

pub fn nothing_to_skip() -> StatusMessage {
    StatusMessage::text("There is nothing to skip!")
}

pub fn nothing_playing() -> StatusMessage {
    StatusMessage::text("Nothing is playing right now.")
}

pub fn queue_empty() -> StatusMessage {
    StatusMessage::text("There are no songs in the queue!")
}

pub fn queue_unavailable() -> StatusMessage {
    StatusMessage::text("Sorry, I can't display the queue right now. Try again in a moment.")
}

pub fn queue_cleared() -> StatusMessage {
    StatusMessage::text("The queue has been cleared.")
}

pub fn volume_set(percent: u8) -> StatusMessage {
    StatusMessage::text(format!(":speaker: Volume set to {}", wrap(percent)))
}

pub fn volume_out_of_range() -> StatusMessage {
    StatusMessage::text("Use a number between 0 and 100!")
}

pub fn not_in_voice_channel() -> StatusMessage {
    StatusMessage::text("You are not in a voice channel!")
}

pub fn join_failed(channel: &str) -> StatusMessage {
    StatusMessage::text(format!("Could not join **{channel}**. Try again later."))
}

pub fn joined(channel: &str) -> StatusMessage {
    StatusMessage::text(format!("Joined and bound to :speaker: **{channel}**."))
}

pub fn already_connected(channel: &str) -> StatusMessage {
    StatusMessage::text(format!("Already connected to :speaker: **{channel}**."))
}

pub fn leaving(channel: &str) -> StatusMessage {
    StatusMessage::text(format!("Leaving **{channel}**."))
}

pub fn leaving_idle(channel: &str) -> StatusMessage {
    StatusMessage::text(format!("Leaving **{channel}** after a period of inactivity."))
}

pub fn not_in_voice_self() -> StatusMessage {
    StatusMessage::text("I am not in a voice channel!")
}

pub fn engine_stopped() -> StatusMessage {
    StatusMessage::text("That request arrived while I was shutting down. Please send it again.")
}

pub fn track_failed(title: &str) -> StatusMessage {
    StatusMessage::text(format!("Could not play {}, skipping.", wrap(title)))
}

/// Render the first `limit` queue positions, one per line.
pub fn render_queue(queue: &TrackQueue, limit: usize) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for (position, track) in queue.iter().take_while(|(position, _)| *position < limit) {
        let info = track.info();
        writeln!(
            out,
            "{}. {} ({}) requested by {}",
            position + 1,
            info.title,
            wrap(&info.duration),
            info.requester
        )?;
    }
    let remaining = queue.iter().filter(|(position, _)| *position >= limit).count();
    if remaining > 0 {
        write!(out, "\nand {remaining} more.")?;
    }
    Ok(out)
}
