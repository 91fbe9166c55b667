//! Capability types for capability-gated host access.
//!
//! An overlay declares the capabilities it needs in its manifest; the
//! sandbox host surface refuses any call whose capability was not
//! declared. `log` is always available and has no capability.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A capability grants permission for one class of host operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Read-only access to the persistence collaborator
    StoreRead,

    /// Write access to the persistence collaborator
    StoreWrite,

    /// Permission to emit events onto the bus
    EventPublish,
}

impl Capability {
    /// Get a string representation of the capability
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StoreRead => "StoreRead",
            Self::StoreWrite => "StoreWrite",
            Self::EventPublish => "EventPublish",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of capabilities declared by an overlay manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: BTreeSet::new(),
        }
    }

    /// Create a set holding every capability
    #[must_use]
    pub fn all() -> Self {
        let mut set = Self::new();
        set.grant(Capability::StoreRead);
        set.grant(Capability::StoreWrite);
        set.grant(Capability::EventPublish);
        set
    }

    /// Grant a capability
    pub fn grant(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Grant a capability, builder style
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.grant(capability);
        self
    }

    /// Check if a capability is granted
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Get the number of capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Iterate over capabilities in deterministic order
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}
