//! Bounded dead-letter queue for undeliverable events.
//!
//! This is the load-shedding boundary: a slow or broken subscriber can
//! never grow kernel memory without bound. The queue holds a hard cap of
//! entries and evicts the oldest first.

use crate::event::Event;
use serde::{Deserialize, Serialize};
use spire_core::Timestamp;
use std::collections::VecDeque;

/// An event that exhausted its delivery attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The undeliverable event
    pub event: Event,
    /// Why delivery failed
    pub reason: String,
    /// Delivery attempts made before giving up
    pub attempts: u32,
    /// When the event was dead-lettered
    pub dead_lettered_at: Timestamp,
}

/// Bounded FIFO queue of dead letters
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
    evicted: u64,
}

impl DeadLetterQueue {
    /// Default capacity
    pub const DEFAULT_CAPACITY: usize = 1_000;

    /// Create a queue with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    /// Add a dead letter, evicting the oldest entry at capacity
    pub fn push(&mut self, letter: DeadLetter) {
        if self.capacity == 0 {
            self.evicted += 1;
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(letter);
    }

    /// Number of entries currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries evicted since creation
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &DeadLetter> {
        self.entries.iter()
    }

    /// Remove and return all entries, oldest first
    pub fn drain(&mut self) -> Vec<DeadLetter> {
        self.entries.drain(..).collect()
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn make_letter(n: u64) -> DeadLetter {
        DeadLetter {
            event: Event::new("failing.event", Value::from(n)),
            reason: "handler error".to_string(),
            attempts: 3,
            dead_lettered_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_push_and_len() {
        let mut queue = DeadLetterQueue::new(10);
        assert!(queue.is_empty());
        queue.push(make_letter(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut queue = DeadLetterQueue::new(3);
        for n in 0..10 {
            queue.push(make_letter(n));
            assert!(queue.len() <= 3);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.evicted(), 7);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut queue = DeadLetterQueue::new(2);
        queue.push(make_letter(0));
        queue.push(make_letter(1));
        queue.push(make_letter(2));

        let payloads: Vec<u64> = queue
            .iter()
            .map(|l| l.event.payload.as_u64().unwrap())
            .collect();
        assert_eq!(payloads, vec![1, 2]);
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut queue = DeadLetterQueue::new(0);
        queue.push(make_letter(1));
        assert!(queue.is_empty());
        assert_eq!(queue.evicted(), 1);
    }

    #[test]
    fn test_drain() {
        let mut queue = DeadLetterQueue::new(5);
        queue.push(make_letter(1));
        queue.push(make_letter(2));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn queue_bounded_under_any_load(capacity in 1usize..50, pushes in 0u64..500) {
                let mut queue = DeadLetterQueue::new(capacity);
                for n in 0..pushes {
                    queue.push(make_letter(n));
                    prop_assert!(queue.len() <= capacity);
                }
                prop_assert_eq!(queue.len() as u64 + queue.evicted(), pushes);
            }
        }
    }
}
