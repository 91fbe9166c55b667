//! Administrative control surface.
//!
//! Read access to overlay state, circuit-breaker state, and pipeline
//! execution history; write access limited to activating/deactivating
//! overlays, resetting breakers, and triggering pipeline runs. The
//! outward-facing API layer consumes these operations; their transport
//! encoding is not defined here.

use crate::context::KernelContext;
use serde_json::Value;
use spire_bus::{DeadLetter, DeliveryStatsSnapshot};
use spire_core::{KernelResult, OverlayId};
use spire_overlay::{
    BreakerSnapshot, InvocationRecord, OverlayHealth, OverlayInfo, OverlayState,
};
use spire_pipeline::PipelineExecution;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Administrative view over a kernel
pub struct AdminSurface {
    ctx: Arc<KernelContext>,
}

impl AdminSurface {
    /// Create a surface over a kernel context
    #[must_use]
    pub fn new(ctx: Arc<KernelContext>) -> Self {
        Self { ctx }
    }

    // Read surface

    /// All registered overlays, in registration order
    #[must_use]
    pub fn overlays(&self) -> Vec<OverlayInfo> {
        self.ctx.manager().list()
    }

    /// Overlays currently in a given state
    #[must_use]
    pub fn overlays_in_state(&self, state: OverlayState) -> Vec<OverlayId> {
        self.ctx.manager().get_by_state(state)
    }

    /// Circuit-breaker snapshots
    #[must_use]
    pub fn breakers(&self) -> BTreeMap<OverlayId, BreakerSnapshot> {
        self.ctx.manager().breaker_snapshots()
    }

    /// Health of every overlay
    pub async fn health(&self) -> BTreeMap<OverlayId, OverlayHealth> {
        self.ctx.manager().health_snapshot().await
    }

    /// Overlay invocation history, oldest first
    #[must_use]
    pub fn invocation_history(&self) -> Vec<InvocationRecord> {
        self.ctx.manager().execution_history()
    }

    /// Pipeline run history, oldest first
    #[must_use]
    pub fn pipeline_history(&self) -> Vec<PipelineExecution> {
        self.ctx.pipeline().history()
    }

    /// Bus delivery statistics
    #[must_use]
    pub fn bus_stats(&self) -> DeliveryStatsSnapshot {
        self.ctx.bus().stats()
    }

    /// Current dead letters, oldest first
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.ctx.bus().dead_letters()
    }

    // Write surface

    /// Activate an overlay
    ///
    /// # Errors
    ///
    /// As [`spire_overlay::OverlayManager::activate`].
    pub async fn activate(&self, id: OverlayId) -> KernelResult<()> {
        self.ctx.manager().activate(id).await
    }

    /// Activate with the administrative override (lifts quarantine)
    ///
    /// # Errors
    ///
    /// As [`spire_overlay::OverlayManager::activate_override`].
    pub async fn activate_override(&self, id: OverlayId) -> KernelResult<()> {
        self.ctx.manager().activate_override(id).await
    }

    /// Deactivate a non-critical overlay
    ///
    /// # Errors
    ///
    /// `PolicyDenied` for critical overlays; use
    /// [`AdminSurface::deactivate_override`].
    pub fn deactivate(&self, id: OverlayId) -> KernelResult<()> {
        self.ctx.manager().deactivate(id)
    }

    /// Deactivate with the administrative override
    ///
    /// # Errors
    ///
    /// As [`spire_overlay::OverlayManager::deactivate_override`].
    pub fn deactivate_override(&self, id: OverlayId) -> KernelResult<()> {
        self.ctx.manager().deactivate_override(id)
    }

    /// Manually reset an overlay's circuit breaker
    ///
    /// Returns `false` if no breaker state exists for the overlay.
    pub fn reset_breaker(&self, id: OverlayId) -> bool {
        self.ctx.manager().reset_breaker(id)
    }

    /// Trigger a pipeline run
    pub async fn trigger_run(&self, initial_data: Value) -> PipelineExecution {
        self.ctx.pipeline().run(initial_data, None).await
    }
}
