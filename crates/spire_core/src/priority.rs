//! Event priority levels.
//!
//! Priorities are totally ordered so subscriptions can filter with a
//! simple `>=` comparison.

use serde::{Deserialize, Serialize};

/// Priority of a published event
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum EventPriority {
    /// Background/bulk traffic
    Low,
    /// Default priority
    #[default]
    Normal,
    /// Elevated priority
    High,
    /// Highest priority - operator and fault events
    Critical,
}

impl EventPriority {
    /// All priorities in ascending order
    pub const ALL: [EventPriority; 4] = [Self::Low, Self::Normal, Self::High, Self::Critical];

    /// Get a string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for EventPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
