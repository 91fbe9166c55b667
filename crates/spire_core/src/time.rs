//! Wall-clock timestamps.
//!
//! Timestamps are metadata only. Execution logic never branches on wall
//! time; deadlines and timeouts use the runtime's monotonic clock.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall clock timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub seconds: u64,
    /// Subsecond nanoseconds
    pub nanos: u32,
}

impl Timestamp {
    /// Create a new timestamp
    #[must_use]
    pub const fn new(seconds: u64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Get the current timestamp
    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards");
        Self {
            seconds: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        }
    }

    /// Convert to milliseconds since the epoch
    #[must_use]
    pub const fn as_millis(&self) -> u128 {
        self.seconds as u128 * 1_000 + self.nanos as u128 / 1_000_000
    }

    /// Get duration since an earlier timestamp (saturating at zero)
    #[must_use]
    pub fn duration_since(&self, earlier: &Timestamp) -> Duration {
        let this = Duration::new(self.seconds, self.nanos);
        let that = Duration::new(earlier.seconds, earlier.nanos);
        this.saturating_sub(that)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}
