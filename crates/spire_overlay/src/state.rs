//! Overlay lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayState {
    /// Registered, not yet initialized
    Registered,
    /// Initialization in progress
    Loading,
    /// Initialized and receiving work
    Active,
    /// Deactivated; retains registration
    Inactive,
    /// Isolated after repeated faults; leaves only via admin override
    Quarantined,
}

impl OverlayState {
    /// Whether a transition between two states is legal
    #[must_use]
    pub const fn can_transition(self, to: OverlayState) -> bool {
        use OverlayState::*;
        matches!(
            (self, to),
            (Registered, Loading)
                | (Loading, Active)
                | (Loading, Registered) // initialization failed
                | (Active, Inactive)
                | (Inactive, Active)
                | (Registered, Quarantined)
                | (Loading, Quarantined)
                | (Active, Quarantined)
                | (Inactive, Quarantined)
                | (Quarantined, Active) // admin override only
        )
    }

    /// Get a string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Quarantined => "quarantined",
        }
    }
}

impl std::fmt::Display for OverlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
