//! The fixed phase sequence and per-phase policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One stage of the fixed pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Bring the unit of work into the kernel
    Ingestion,
    /// Derive signals from the work
    Analysis,
    /// Check invariants before commitment
    Validation,
    /// Agree on the outcome
    Consensus,
    /// Apply the outcome
    Execution,
    /// Spread derived effects
    Propagation,
    /// Finalize bookkeeping
    Settlement,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 7] = [
        Self::Ingestion,
        Self::Analysis,
        Self::Validation,
        Self::Consensus,
        Self::Execution,
        Self::Propagation,
        Self::Settlement,
    ];

    /// Phase name used for overlay registration
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Analysis => "analysis",
            Self::Validation => "validation",
            Self::Consensus => "consensus",
            Self::Execution => "execution",
            Self::Propagation => "propagation",
            Self::Settlement => "settlement",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Policy for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// The phase
    pub phase: Phase,
    /// A required phase aborts the pipeline on failure
    pub required: bool,
    /// Hard deadline per attempt
    pub timeout: Duration,
    /// Invoke the phase's overlays concurrently
    pub parallel: bool,
    /// Retries after the first failed attempt
    pub max_retries: u32,
}

impl PhaseConfig {
    /// Create a config with defaults: optional, 30 s timeout,
    /// sequential, no retries
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            required: false,
            timeout: Duration::from_secs(30),
            parallel: false,
            max_retries: 0,
        }
    }

    /// Mark the phase required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke overlays concurrently within the phase
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// The default phase policy table
#[must_use]
pub fn default_configs() -> Vec<PhaseConfig> {
    vec![
        PhaseConfig::new(Phase::Ingestion).required(),
        PhaseConfig::new(Phase::Analysis).parallel(),
        PhaseConfig::new(Phase::Validation).required().with_max_retries(1),
        PhaseConfig::new(Phase::Consensus).required(),
        PhaseConfig::new(Phase::Execution).required().with_max_retries(1),
        PhaseConfig::new(Phase::Propagation).parallel(),
        PhaseConfig::new(Phase::Settlement).required(),
    ]
}
