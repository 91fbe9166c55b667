//! Pipeline execution state.

use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spire_core::{ExecutionId, Timestamp};
use std::time::Duration;

/// Overall status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Phases are still executing
    Running,
    /// Every phase concluded (optional failures included)
    Completed,
    /// A required phase failed; the failing phase is recorded
    Failed(Phase),
}

/// Outcome of one phase within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// The phase
    pub phase: Phase,
    /// Whether the phase succeeded
    pub success: bool,
    /// Whether an optional-phase failure was skipped over
    pub skipped: bool,
    /// Attempts made (1 + retries used)
    pub attempts: u32,
    /// Wall time spent across attempts
    pub wall_time: Duration,
    /// Data the phase contributed to the merged context
    pub data: Value,
    /// Failure description, if any
    pub error: Option<String>,
}

/// State of one pipeline run
///
/// Mutated only by the owning pipeline; moved into bounded history on
/// completion or abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    /// Run identifier
    pub execution_id: ExecutionId,
    /// Index of the phase currently (or last) executing
    pub phase_index: usize,
    /// Accumulated data; later phases see earlier phases' outputs
    pub merged_data: Map<String, Value>,
    /// Per-phase outcomes in execution order
    pub per_phase_results: Vec<PhaseResult>,
    /// When the run started
    pub started_at: Timestamp,
    /// When the run finished or aborted
    pub finished_at: Option<Timestamp>,
    /// Overall status
    pub status: ExecutionStatus,
}

impl PipelineExecution {
    /// Start a new run seeded with initial data
    ///
    /// A JSON object seeds the merged context directly; any other value
    /// is stored under the `"input"` key.
    #[must_use]
    pub fn new(initial_data: Value) -> Self {
        let merged_data = match initial_data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        Self {
            execution_id: ExecutionId::new(),
            phase_index: 0,
            merged_data,
            per_phase_results: Vec::new(),
            started_at: Timestamp::now(),
            finished_at: None,
            status: ExecutionStatus::Running,
        }
    }

    /// Merge a phase's output object into the shared context
    ///
    /// Later keys overwrite earlier ones; non-object output is ignored.
    pub fn merge(&mut self, data: Value) {
        if let Value::Object(map) = data {
            self.merged_data.extend(map);
        }
    }

    /// Whether the run failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, ExecutionStatus::Failed(_))
    }

    /// The failing phase, if the run failed
    #[must_use]
    pub const fn failed_phase(&self) -> Option<Phase> {
        match self.status {
            ExecutionStatus::Failed(phase) => Some(phase),
            _ => None,
        }
    }
}
