//! The overlay contract.
//!
//! An overlay is an external collaborator behind a fixed trait:
//! `initialize`, `execute`, `health_check`, `cleanup`. The kernel never
//! inspects an overlay's internal logic; it enforces the contract's
//! shape, timeouts, and resource budgets. Concrete overlay types are
//! separate structs dispatched through a trait object.

use crate::health::HealthStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spire_bus::Event;
use spire_core::{ChainId, KernelResult, OverlayId};
use spire_sandbox::HostApi;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-invocation context handed to an overlay
///
/// All host access (logging, store reads/writes, event emission) goes
/// through `host`; the overlay has no other ambient capability.
pub struct OverlayContext {
    /// The overlay being invoked
    pub overlay_id: OverlayId,
    /// Pipeline phase driving the invocation, if any
    pub phase: Option<String>,
    /// Cascade chain the triggering event belongs to, if any
    pub chain_id: Option<ChainId>,
    /// Capability-gated host surface
    pub host: Arc<HostApi>,
}

/// Result returned by an overlay's `execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OverlayResult {
    /// Whether the overlay succeeded
    pub success: bool,
    /// Data produced; merged into pipeline context by phase runs
    pub data: Value,
    /// Failure description when `success` is false
    pub error: Option<String>,
    /// Events the overlay wants emitted onto the bus
    pub events_to_emit: Vec<Event>,
    /// Free-form numeric metrics
    pub metrics: BTreeMap<String, f64>,
}

impl OverlayResult {
    /// Successful result with output data
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    /// Failed result with a reason
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Queue an event for emission
    #[must_use]
    pub fn with_event(mut self, event: Event) -> Self {
        self.events_to_emit.push(event);
        self
    }

    /// Attach a metric
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// The overlay contract
#[async_trait]
pub trait Overlay: Send + Sync {
    /// One-time initialization; `Ok(false)` rejects activation
    async fn initialize(&self) -> KernelResult<bool>;

    /// Process one invocation
    ///
    /// # Errors
    ///
    /// An error is a contract violation and counts against the
    /// overlay's circuit breaker, as does `success = false`.
    async fn execute(
        &self,
        ctx: &OverlayContext,
        event: Option<&Event>,
        input: Value,
    ) -> KernelResult<OverlayResult>;

    /// Report current health
    async fn health_check(&self) -> HealthStatus;

    /// Release resources on deregistration
    async fn cleanup(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_success() {
        let result = OverlayResult::success(json!({"score": 0.9}));
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.data, json!({"score": 0.9}));
    }

    #[test]
    fn test_result_failure() {
        let result = OverlayResult::failure("backend unavailable");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("backend unavailable"));
    }

    #[test]
    fn test_result_builders() {
        let result = OverlayResult::success(Value::Null)
            .with_event(Event::new("derived.signal", Value::Null))
            .with_metric("latency_ms", 12.5);
        assert_eq!(result.events_to_emit.len(), 1);
        assert_eq!(result.metrics.get("latency_ms"), Some(&12.5));
    }
}
