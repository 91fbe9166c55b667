//! Pipeline hook points.
//!
//! External collaborators (audit logging, metrics) observe runs at
//! three granularities without being compiled into the pipeline:
//! before any phase, after any phase, and on overall completion.

use crate::execution::{PhaseResult, PipelineExecution};
use crate::phase::Phase;
use async_trait::async_trait;
use serde_json::{Map, Value};
use spire_bus::Event;
use spire_core::KernelResult;

/// Observer over pipeline runs; every method defaults to a no-op
#[async_trait]
pub trait PipelineHook: Send + Sync {
    /// Called before a phase starts
    async fn before_phase(&self, _execution: &PipelineExecution, _phase: Phase) {}

    /// Called after a phase concludes
    async fn after_phase(&self, _execution: &PipelineExecution, _result: &PhaseResult) {}

    /// Called once when the run completes or aborts
    async fn on_complete(&self, _execution: &PipelineExecution) {}
}

/// Replaces the default "invoke registered overlays" behavior for a
/// phase whose work is a single core operation
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// Run the phase; returned object data merges into the context
    ///
    /// # Errors
    ///
    /// An error fails the phase attempt, subject to the phase's retry
    /// budget and required/optional policy.
    async fn run_phase(
        &self,
        phase: Phase,
        merged: &Map<String, Value>,
        trigger: Option<&Event>,
    ) -> KernelResult<Value>;
}
