//! Delivery statistics with a bounded sliding window.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Counters plus a bounded window of delivery latency samples
#[derive(Debug)]
pub struct DeliveryStats {
    delivered: u64,
    failed: u64,
    retried: u64,
    dead_lettered: u64,
    latency_samples: VecDeque<Duration>,
    window: usize,
}

impl DeliveryStats {
    /// Default sample window size
    pub const DEFAULT_WINDOW: usize = 1_000;

    /// Create stats with the given sample window
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            delivered: 0,
            failed: 0,
            retried: 0,
            dead_lettered: 0,
            latency_samples: VecDeque::with_capacity(window.min(Self::DEFAULT_WINDOW)),
            window,
        }
    }

    /// Record a successful delivery and its latency
    pub fn record_delivery(&mut self, latency: Duration) {
        self.delivered += 1;
        while self.latency_samples.len() >= self.window.max(1) {
            self.latency_samples.pop_front();
        }
        if self.window > 0 {
            self.latency_samples.push_back(latency);
        }
    }

    /// Record a failed delivery attempt
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Record a retry
    pub fn record_retry(&mut self) {
        self.retried += 1;
    }

    /// Record a dead-lettered event
    pub fn record_dead_letter(&mut self) {
        self.dead_lettered += 1;
    }

    /// Mean latency over the current window
    #[must_use]
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latency_samples.is_empty() {
            return None;
        }
        let total: Duration = self.latency_samples.iter().sum();
        Some(total / self.latency_samples.len() as u32)
    }

    /// Number of samples in the window
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.latency_samples.len()
    }

    /// Snapshot for the admin surface
    #[must_use]
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            delivered: self.delivered,
            failed: self.failed,
            retried: self.retried,
            dead_lettered: self.dead_lettered,
            mean_latency_micros: self.mean_latency().map(|d| d.as_micros() as u64),
            sample_count: self.latency_samples.len(),
        }
    }
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

/// Serializable point-in-time view of [`DeliveryStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatsSnapshot {
    /// Successful deliveries
    pub delivered: u64,
    /// Failed delivery attempts
    pub failed: u64,
    /// Retries performed
    pub retried: u64,
    /// Events dead-lettered
    pub dead_lettered: u64,
    /// Mean latency over the window, in microseconds
    pub mean_latency_micros: Option<u64>,
    /// Samples currently in the window
    pub sample_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = DeliveryStats::new(10);
        stats.record_delivery(Duration::from_millis(5));
        stats.record_failure();
        stats.record_retry();
        stats.record_dead_letter();

        let snap = stats.snapshot();
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.retried, 1);
        assert_eq!(snap.dead_lettered, 1);
    }

    #[test]
    fn test_window_evicts_fifo() {
        let mut stats = DeliveryStats::new(3);
        for ms in 1..=5u64 {
            stats.record_delivery(Duration::from_millis(ms));
        }
        assert_eq!(stats.sample_count(), 3);
        // Window holds 3, 4, 5 -> mean 4ms
        assert_eq!(stats.mean_latency(), Some(Duration::from_millis(4)));
    }

    #[test]
    fn test_mean_latency_empty() {
        let stats = DeliveryStats::new(10);
        assert_eq!(stats.mean_latency(), None);
    }

    #[test]
    fn test_counters_survive_window_eviction() {
        let mut stats = DeliveryStats::new(2);
        for _ in 0..100 {
            stats.record_delivery(Duration::from_millis(1));
        }
        assert_eq!(stats.snapshot().delivered, 100);
        assert_eq!(stats.sample_count(), 2);
    }
}
