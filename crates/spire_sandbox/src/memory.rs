//! Memory accounting for sandboxed execution.
//!
//! Tracked allocations are charged against a hard per-invocation cap.
//! Exceeding it raises a fault distinct from fuel exhaustion so callers
//! can tell "too much memory" from "too much work".

use serde::{Deserialize, Serialize};

/// Memory meter for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMeter {
    limit: u64,
    allocated: u64,
    peak: u64,
}

impl MemoryMeter {
    /// Create a meter with a hard byte limit
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            limit,
            allocated: 0,
            peak: 0,
        }
    }

    /// Charge an allocation
    ///
    /// # Errors
    ///
    /// Returns an error if the limit would be exceeded; nothing is
    /// charged in that case.
    pub fn charge(&mut self, bytes: u64) -> Result<(), MemoryError> {
        let next = self.allocated.saturating_add(bytes);
        if next > self.limit {
            return Err(MemoryError::LimitExceeded {
                requested: bytes,
                allocated: self.allocated,
                limit: self.limit,
            });
        }
        self.allocated = next;
        if next > self.peak {
            self.peak = next;
        }
        Ok(())
    }

    /// Release a previous allocation
    pub fn release(&mut self, bytes: u64) {
        self.allocated = self.allocated.saturating_sub(bytes);
    }

    /// Currently allocated bytes
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Peak allocation over the invocation
    #[must_use]
    pub const fn peak(&self) -> u64 {
        self.peak
    }

    /// The hard limit
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// The hard cap would be exceeded
    #[error("memory limit exceeded: requested {requested} with {allocated} allocated, limit {limit}")]
    LimitExceeded {
        /// Bytes requested by the failing allocation
        requested: u64,
        /// Bytes allocated at the time of the request
        allocated: u64,
        /// The hard limit
        limit: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_and_release() {
        let mut meter = MemoryMeter::new(1024);
        meter.charge(512).unwrap();
        assert_eq!(meter.allocated(), 512);
        meter.release(256);
        assert_eq!(meter.allocated(), 256);
        assert_eq!(meter.peak(), 512);
    }

    #[test]
    fn test_limit_is_hard() {
        let mut meter = MemoryMeter::new(100);
        meter.charge(100).unwrap();
        let err = meter.charge(1).unwrap_err();
        assert!(matches!(err, MemoryError::LimitExceeded { .. }));
        assert_eq!(meter.allocated(), 100);
    }

    #[test]
    fn test_release_saturates() {
        let mut meter = MemoryMeter::new(100);
        meter.charge(10).unwrap();
        meter.release(50);
        assert_eq!(meter.allocated(), 0);
    }

    #[test]
    fn test_peak_tracks_high_water_mark() {
        let mut meter = MemoryMeter::new(1000);
        meter.charge(800).unwrap();
        meter.release(700);
        meter.charge(100).unwrap();
        assert_eq!(meter.peak(), 800);
        assert_eq!(meter.allocated(), 200);
    }
}
