//! Unique identifiers for SPIRE entities.
//!
//! All IDs are UUIDs for uniqueness and are serialized in canonical format.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from UUID bytes
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Get as UUID
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Get as bytes
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Event identifier - identifies a single published event
    EventId,
    "evt_"
);

define_id!(
    /// Overlay identifier - identifies a registered overlay instance
    OverlayId,
    "ovl_"
);

define_id!(
    /// Chain identifier - identifies a cascade chain
    ChainId,
    "chain_"
);

define_id!(
    /// Subscription identifier - identifies an event subscription
    SubscriptionId,
    "sub_"
);

define_id!(
    /// Execution identifier - identifies a single pipeline run
    ExecutionId,
    "exec_"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let event_id = EventId::new();
        let overlay_id = OverlayId::new();
        let chain_id = ChainId::new();

        assert_ne!(event_id, EventId::new());
        assert_ne!(overlay_id, OverlayId::new());
        assert_ne!(chain_id, ChainId::new());
    }

    #[test]
    fn test_id_from_bytes() {
        let bytes = [7u8; 16];
        let id = OverlayId::from_bytes(bytes);
        assert_eq!(id.as_bytes(), &bytes);
        assert_eq!(id, OverlayId::from_bytes(bytes));
    }

    #[test]
    fn test_id_display_prefixes() {
        assert!(format!("{}", EventId::new()).starts_with("evt_"));
        assert!(format!("{}", OverlayId::new()).starts_with("ovl_"));
        assert!(format!("{}", ChainId::new()).starts_with("chain_"));
        assert!(format!("{}", SubscriptionId::new()).starts_with("sub_"));
        assert!(format!("{}", ExecutionId::new()).starts_with("exec_"));
    }

    #[test]
    fn test_id_ord() {
        let id1 = OverlayId::new();
        let id2 = OverlayId::new();
        // IDs are comparable for deterministic set ordering
        let _ = id1.cmp(&id2);
    }

    #[test]
    fn test_id_serde_round_trip() {
        let id = EventId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
