//! Fuel metering for sandboxed execution.
//!
//! Fuel is an abstract unit of metered work. Every host call consumes
//! from a fixed per-invocation budget drawn from the overlay manifest.
//! The budget is final: there is no refill or reset within an
//! invocation, and consumption is monotonic.

use serde::{Deserialize, Serialize};

/// Fuel meter for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelMeter {
    budget: u64,
    consumed: u64,
}

impl FuelMeter {
    /// Create a meter with a fixed budget
    #[must_use]
    pub const fn new(budget: u64) -> Self {
        Self { budget, consumed: 0 }
    }

    /// Consume fuel for an operation
    ///
    /// The failing call consumes nothing: an invocation aborts the
    /// instant it would exceed its budget, with no partial credit.
    ///
    /// # Errors
    ///
    /// Returns an error if the budget would be exceeded.
    pub fn consume(&mut self, amount: u64) -> Result<(), FuelError> {
        let remaining = self.remaining();
        if amount > remaining {
            return Err(FuelError::Exhausted {
                requested: amount,
                remaining,
            });
        }
        self.consumed += amount;
        Ok(())
    }

    /// Remaining fuel
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.budget - self.consumed
    }

    /// Fuel consumed so far
    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// The fixed budget
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Whether the budget is fully consumed
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.consumed >= self.budget
    }

    /// Fuel usage as a percentage of the budget
    #[must_use]
    pub fn usage_percent(&self) -> f64 {
        if self.budget == 0 {
            return 100.0;
        }
        (self.consumed as f64 / self.budget as f64) * 100.0
    }
}

/// Fuel-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuelError {
    /// The budget would be exceeded
    #[error("fuel exhausted: requested {requested}, remaining {remaining}")]
    Exhausted {
        /// Fuel requested by the failing operation
        requested: u64,
        /// Fuel that was still available
        remaining: u64,
    },
}
