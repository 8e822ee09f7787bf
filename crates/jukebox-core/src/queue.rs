//! Ordered track queue for a single engine.
//!
//! Slot 0 is the track that is playing or about to play. Explicit-index inserts
//! overwrite that slot, and inserts past the end leave empty slots behind.

use std::collections::BTreeMap;

use crate::track::Track;

/// Slots are keyed by absolute position since the queue was created, so popping the
/// head only moves `head` forward. Keys are `u128` so `head + usize::MAX` always fits.
#[derive(Debug, Default)]
pub struct TrackQueue {
    slots: BTreeMap<u128, Track>,
    head: u128,
    end: u128,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tracks. Empty slots are not counted.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append, or overwrite/create the slot at `index`.
    pub fn insert(&mut self, track: Track, index: Option<usize>) {
        let key = match index {
            None => self.end,
            Some(index) => self.head + index as u128,
        };
        self.end = self.end.max(key + 1);
        self.slots.insert(key, track);
    }

    /// Track at slot `index`, if the slot exists and is filled.
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.slots.get(&(self.head + index as u128))
    }

    pub fn head(&self) -> Option<&Track> {
        self.get(0)
    }

    /// Remove slot 0. Returns the track it held, if any.
    pub fn pop_front(&mut self) -> Option<Track> {
        if self.head == self.end {
            return None;
        }
        let track = self.slots.remove(&self.head);
        self.head += 1;
        track
    }

    /// Drop empty slots at the front so the head is either a track or the queue is empty.
    /// Returns the number of slots dropped, saturating at `usize::MAX`.
    pub fn discard_leading_gaps(&mut self) -> usize {
        let next = self.slots.keys().next().copied().unwrap_or(self.end);
        let dropped = next - self.head;
        self.head = next;
        usize::try_from(dropped).unwrap_or(usize::MAX)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = self.end;
    }

    /// Iterate `(position, track)` over filled slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Track)> {
        // Every key was inserted at most `usize::MAX` past a head that only grows.
        let head = self.head;
        self.slots
            .iter()
            .map(move |(key, track)| ((key - head) as usize, track))
    }

    /// Titles of filled slots in order.
    pub fn titles(&self) -> Vec<String> {
        self.iter().map(|(_, t)| t.title().to_string()).collect()
    }
}
