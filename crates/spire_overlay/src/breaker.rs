//! Per-overlay circuit breaker.
//!
//! Failure isolation for consistently failing overlays. Reaching the
//! failure threshold opens the breaker; while open, calls short-circuit
//! without touching the sandbox. After the recovery timeout the breaker
//! half-opens and admits probe calls; enough probe successes close it,
//! any probe failure reopens it. All transitions are serialized by one
//! mutex per breaker, so concurrent successes and failures for the same
//! overlay can never race into an inconsistent state.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Time an open breaker waits before half-opening
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes that close the breaker
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Breaker state machine positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerState {
    /// Calls flow normally
    Closed,
    /// Calls short-circuit
    Open,
    /// Probe calls are admitted
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Serializable point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: BreakerState,
    /// Consecutive failures observed
    pub consecutive_failures: u32,
    /// Consecutive successes observed while half-open
    pub half_open_successes: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// A per-overlay circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now
    ///
    /// An open breaker whose recovery timeout has elapsed transitions to
    /// half-open here and admits the call as a probe.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// [`CircuitBreaker::try_acquire`] against an explicit clock
    #[must_use]
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::info!("circuit breaker half-open; admitting probes");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    tracing::info!("circuit breaker closed after successful probes");
                }
            }
            BreakerState::Open => {
                // Success while open means the call raced the transition;
                // leave the breaker to its recovery timer
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// [`CircuitBreaker::record_failure`] against an explicit clock
    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                // Any probe failure reopens immediately
                inner.state = BreakerState::Open;
                inner.half_open_successes = 0;
                inner.opened_at = Some(now);
                tracing::warn!("circuit breaker reopened by failed probe");
            }
            BreakerState::Open => {}
        }
    }

    /// Manual operator reset to closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
        tracing::info!("circuit breaker manually reset");
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Point-in-time snapshot
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }

    #[test]
    fn test_opens_after_exact_failure_threshold() {
        let breaker = CircuitBreaker::new(fast_config());
        let now = Instant::now();

        breaker.record_failure_at(now);
        breaker.record_failure_at(now);
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure_at(now);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire_at(now));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(fast_config());
        let now = Instant::now();

        breaker.record_failure_at(now);
        breaker.record_failure_at(now);
        breaker.record_success();
        breaker.record_failure_at(now);
        breaker.record_failure_at(now);
        // Only two consecutive failures since the success
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_recovery_timeout_half_opens() {
        let breaker = CircuitBreaker::new(fast_config());
        let now = Instant::now();

        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        assert!(!breaker.try_acquire_at(now + Duration::from_secs(29)));
        assert_eq!(breaker.state(), BreakerState::Open);

        assert!(breaker.try_acquire_at(now + Duration::from_secs(30)));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_probe_successes_close() {
        let breaker = CircuitBreaker::new(fast_config());
        let now = Instant::now();

        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        assert!(breaker.try_acquire_at(now + Duration::from_secs(31)));

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire_at(now));
    }

    #[test]
    fn test_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(fast_config());
        let now = Instant::now();

        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        let later = now + Duration::from_secs(31);
        assert!(breaker.try_acquire_at(later));
        breaker.record_success();

        breaker.record_failure_at(later);
        assert_eq!(breaker.state(), BreakerState::Open);
        // The recovery timer restarted at the probe failure
        assert!(!breaker.try_acquire_at(later + Duration::from_secs(29)));
        assert!(breaker.try_acquire_at(later + Duration::from_secs(30)));
    }

    #[test]
    fn test_manual_reset() {
        let breaker = CircuitBreaker::new(fast_config());
        let now = Instant::now();

        for _ in 0..3 {
            breaker.record_failure_at(now);
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        let snap = breaker.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert!(breaker.try_acquire_at(now));
    }

    #[test]
    fn test_snapshot() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record_failure();
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.consecutive_failures, 1);
    }
}
