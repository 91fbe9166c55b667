//! Overlay health reporting.

use crate::breaker::BreakerSnapshot;
use crate::state::OverlayState;
use serde::{Deserialize, Serialize};

/// Health reported by an overlay's `health_check`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Operating with reduced capacity
    Degraded,
    /// Not operating
    Unhealthy,
    /// Health could not be determined
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Get a string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One overlay's entry in a health snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayHealth {
    /// Overlay name
    pub name: String,
    /// Lifecycle state
    pub state: OverlayState,
    /// Self-reported health
    pub status: HealthStatus,
    /// Circuit breaker state, if a breaker exists for the overlay
    pub breaker: Option<BreakerSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_unknown() {
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
    }
}
