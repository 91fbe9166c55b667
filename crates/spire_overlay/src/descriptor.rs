//! Overlay registration descriptors.

use serde::{Deserialize, Serialize};
use spire_bus::EventType;
use spire_core::{Capability, CapabilitySet};
use spire_sandbox::SandboxManifest;
use std::collections::BTreeSet;

/// Everything the kernel needs to register and invoke an overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayDescriptor {
    /// Unique overlay name
    pub name: String,
    /// Overlay version string
    pub version: String,
    /// Event types the overlay subscribes to
    pub subscribed_event_types: BTreeSet<EventType>,
    /// Pipeline phases the overlay participates in
    pub phases: BTreeSet<String>,
    /// Capabilities the overlay declares for host access
    pub required_capabilities: CapabilitySet,
    /// Critical overlays reject normal deactivation
    pub is_critical: bool,
    /// Sandbox budgets for each invocation
    pub manifest: SandboxManifest,
}

impl OverlayDescriptor {
    /// Create a descriptor with defaults
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            subscribed_event_types: BTreeSet::new(),
            phases: BTreeSet::new(),
            required_capabilities: CapabilitySet::new(),
            is_critical: false,
            manifest: SandboxManifest::new(),
        }
    }

    /// Subscribe to an event type
    #[must_use]
    pub fn subscribes_to(mut self, event_type: impl Into<EventType>) -> Self {
        self.subscribed_event_types.insert(event_type.into());
        self
    }

    /// Participate in a pipeline phase
    #[must_use]
    pub fn in_phase(mut self, phase: impl Into<String>) -> Self {
        self.phases.insert(phase.into());
        self
    }

    /// Declare a capability
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.required_capabilities.grant(capability);
        self
    }

    /// Mark the overlay critical
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    /// Set the sandbox manifest
    #[must_use]
    pub fn with_manifest(mut self, manifest: SandboxManifest) -> Self {
        self.manifest = manifest;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builders() {
        let descriptor = OverlayDescriptor::new("scoring", "1.2.0")
            .subscribes_to("content.created")
            .subscribes_to("content.updated")
            .in_phase("analysis")
            .with_capability(Capability::StoreRead)
            .critical();

        assert_eq!(descriptor.name, "scoring");
        assert_eq!(descriptor.subscribed_event_types.len(), 2);
        assert!(descriptor.phases.contains("analysis"));
        assert!(descriptor.required_capabilities.has(Capability::StoreRead));
        assert!(descriptor.is_critical);
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = OverlayDescriptor::new("plain", "0.1.0");
        assert!(!descriptor.is_critical);
        assert!(descriptor.subscribed_event_types.is_empty());
        assert!(descriptor.required_capabilities.is_empty());
    }
}
