//! # Event Buffer
//!
//! Bounded sliding window of the most recent events, for pull-based
//! consumers that poll instead of holding a push subscription.
//!
//! Events evicted from the window are permanently unavailable. There is no
//! durability and no replay beyond the configured capacity.

use std::collections::VecDeque;
use std::sync::RwLock;

use crate::event::Event;

/// Bounded FIFO-evicting store of recent events
#[derive(Debug)]
pub struct EventBuffer {
    /// Fixed maximum entry count
    capacity: usize,

    /// Retained events, oldest first
    events: RwLock<VecDeque<Event>>,
}

impl EventBuffer {
    /// Create a buffer retaining at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an event, evicting from the head once at capacity.
    ///
    /// Atomic from a reader's perspective: `query` never observes a
    /// partially appended event.
    pub fn append(&self, event: Event) {
        if let Ok(mut events) = self.events.write() {
            events.push_back(event);

            while events.len() > self.capacity {
                events.pop_front();
            }
        }
    }

    /// Return up to `limit` of the most recent retained events, oldest
    /// first, restricted to `collection` when one is given.
    ///
    /// Does not mutate the buffer; returns an empty vec when nothing
    /// matches.
    pub fn query(&self, limit: usize, collection: Option<&str>) -> Vec<Event> {
        let Ok(events) = self.events.read() else {
            return Vec::new();
        };

        let mut recent: Vec<Event> = events
            .iter()
            .rev()
            .filter(|e| match collection {
                Some(name) => e.collection.as_deref() == Some(name),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect();

        recent.reverse();
        recent
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity of the window
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
