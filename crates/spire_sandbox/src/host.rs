//! Capability-gated host functions.
//!
//! The host surface an overlay sees during one invocation: `log`
//! (always available), `store_read`, `store_write`, and `event_publish`.
//! Calling a host function whose capability was not declared in the
//! overlay manifest is a hard security fault, not a warning. Every call
//! is charged against the invocation's fuel budget before it runs, so a
//! call made after the budget is exhausted has no side effects.

use crate::fuel::FuelMeter;
use crate::memory::MemoryMeter;
use crate::mode::SecurityMode;
use crate::query::QueryGuard;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spire_bus::Event;
use spire_core::{
    Capability, CapabilitySet, KernelError, KernelResult, OverlayId, ResourceFaultKind,
};
use std::sync::{Arc, Mutex};

/// Read/write access to the persistence collaborator
///
/// The kernel never assumes a specific query language; query text is
/// validated by [`QueryGuard`] before it reaches an implementation.
#[async_trait]
pub trait StoreAccess: Send + Sync {
    /// Execute a validated read query
    async fn read(&self, query: &str) -> KernelResult<Value>;

    /// Execute a validated write query
    async fn write(&self, query: &str) -> KernelResult<Value>;
}

/// Fuel cost of each host function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCosts {
    /// Cost of `log`
    pub log: u64,
    /// Cost of `store_read`
    pub store_read: u64,
    /// Cost of `store_write`
    pub store_write: u64,
    /// Cost of `event_publish`
    pub event_publish: u64,
}

impl Default for HostCosts {
    fn default() -> Self {
        Self {
            log: 1,
            store_read: 10,
            store_write: 25,
            event_publish: 5,
        }
    }
}

/// Per-invocation host call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCallStats {
    /// `log` calls made
    pub log_calls: u64,
    /// `store_read` calls made
    pub store_reads: u64,
    /// `store_write` calls made
    pub store_writes: u64,
    /// Events buffered through `event_publish`
    pub events_published: u64,
}

/// The host surface handed to one overlay invocation
pub struct HostApi {
    overlay_id: OverlayId,
    capabilities: CapabilitySet,
    mode: SecurityMode,
    costs: HostCosts,
    fuel: Arc<Mutex<FuelMeter>>,
    memory: Arc<Mutex<MemoryMeter>>,
    store: Arc<dyn StoreAccess>,
    emitted: Mutex<Vec<Event>>,
    stats: Mutex<HostCallStats>,
}

impl HostApi {
    /// Create a host surface bound to an invocation's meters
    #[must_use]
    pub fn new(
        overlay_id: OverlayId,
        capabilities: CapabilitySet,
        mode: SecurityMode,
        fuel: Arc<Mutex<FuelMeter>>,
        memory: Arc<Mutex<MemoryMeter>>,
        store: Arc<dyn StoreAccess>,
    ) -> Self {
        Self {
            overlay_id,
            capabilities,
            mode,
            costs: HostCosts::default(),
            fuel,
            memory,
            store,
            emitted: Mutex::new(Vec::new()),
            stats: Mutex::new(HostCallStats::default()),
        }
    }

    /// Override host call costs
    #[must_use]
    pub fn with_costs(mut self, costs: HostCosts) -> Self {
        self.costs = costs;
        self
    }

    /// Emit a structured log line; always available, no capability
    ///
    /// # Errors
    ///
    /// Returns a fuel fault when the budget is exhausted.
    pub fn log(&self, message: &str) -> KernelResult<()> {
        self.charge_fuel(self.costs.log)?;
        self.stats.lock().unwrap().log_calls += 1;
        tracing::debug!(overlay = %self.overlay_id, "{message}");
        Ok(())
    }

    /// Read from the store; requires [`Capability::StoreRead`]
    ///
    /// # Errors
    ///
    /// Security fault on missing capability or rejected query text;
    /// resource fault on exhausted fuel or memory.
    pub async fn store_read(&self, query: &str) -> KernelResult<Value> {
        self.require(Capability::StoreRead, "store_read")?;
        self.charge_fuel(self.costs.store_read)?;
        QueryGuard::validate_read(query)
            .map_err(|err| self.security_fault("store_read", err.to_string()))?;
        let value = self.store.read(query).await?;
        self.charge_memory(payload_size(&value))?;
        self.stats.lock().unwrap().store_reads += 1;
        Ok(value)
    }

    /// Write to the store; requires [`Capability::StoreWrite`]
    ///
    /// # Errors
    ///
    /// Security fault on missing capability or rejected query text;
    /// resource fault on exhausted fuel or memory.
    pub async fn store_write(&self, query: &str) -> KernelResult<Value> {
        self.require(Capability::StoreWrite, "store_write")?;
        self.charge_fuel(self.costs.store_write)?;
        QueryGuard::validate_write(query)
            .map_err(|err| self.security_fault("store_write", err.to_string()))?;
        let value = self.store.write(query).await?;
        self.charge_memory(payload_size(&value))?;
        self.stats.lock().unwrap().store_writes += 1;
        Ok(value)
    }

    /// Buffer an event for emission; requires [`Capability::EventPublish`]
    ///
    /// Buffered events are collected by the runtime when the invocation
    /// completes and forwarded to the bus by the overlay manager.
    ///
    /// # Errors
    ///
    /// Security fault on missing capability; fuel fault on exhausted
    /// budget.
    pub fn event_publish(&self, event: Event) -> KernelResult<()> {
        self.require(Capability::EventPublish, "event_publish")?;
        self.charge_fuel(self.costs.event_publish)?;
        let event = event.with_source(self.overlay_id);
        self.emitted.lock().unwrap().push(event);
        self.stats.lock().unwrap().events_published += 1;
        Ok(())
    }

    /// Drain the buffered events
    #[must_use]
    pub fn take_emitted(&self) -> Vec<Event> {
        std::mem::take(&mut *self.emitted.lock().unwrap())
    }

    /// Snapshot the call counters
    #[must_use]
    pub fn stats(&self) -> HostCallStats {
        *self.stats.lock().unwrap()
    }

    fn require(&self, capability: Capability, operation: &str) -> KernelResult<()> {
        if self.capabilities.has(capability) {
            return Ok(());
        }
        Err(self.security_fault(
            operation,
            format!("capability {} not declared in manifest", capability),
        ))
    }

    fn security_fault(&self, operation: &str, reason: String) -> KernelError {
        tracing::error!(
            overlay = %self.overlay_id,
            operation,
            reason = %reason,
            "security fault"
        );
        KernelError::SecurityFault {
            operation: operation.to_string(),
            reason,
        }
    }

    fn charge_fuel(&self, amount: u64) -> KernelResult<()> {
        // Trusted in-process mode waives fuel accounting only; capability
        // checks and the other budgets still apply.
        if self.mode == SecurityMode::TrustedInprocess {
            return Ok(());
        }
        self.fuel
            .lock()
            .unwrap()
            .consume(amount)
            .map_err(|err| KernelError::ResourceFault {
                fault: ResourceFaultKind::Fuel,
                detail: err.to_string(),
            })
    }

    fn charge_memory(&self, bytes: u64) -> KernelResult<()> {
        self.memory
            .lock()
            .unwrap()
            .charge(bytes)
            .map_err(|err| KernelError::ResourceFault {
                fault: ResourceFaultKind::Memory,
                detail: err.to_string(),
            })
    }
}

/// Estimate the in-memory size of a JSON payload
fn payload_size(value: &Value) -> u64 {
    serde_json::to_string(value).map(|s| s.len() as u64).unwrap_or(0)
}
