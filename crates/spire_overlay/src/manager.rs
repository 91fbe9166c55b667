//! Overlay registry and manager.
//!
//! Registration indexes each overlay by name, by subscribed event type,
//! and by declared capability. `route_event` invokes all matching ACTIVE
//! overlays concurrently through the sandbox runtime; every invocation
//! passes through that overlay's circuit breaker. Overlay-emitted events
//! are forwarded to the bus, continuing any cascade chain through the
//! bus's cycle gate.

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::contract::{Overlay, OverlayContext, OverlayResult};
use crate::descriptor::OverlayDescriptor;
use crate::health::OverlayHealth;
use crate::state::OverlayState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spire_bus::{Event, EventBus, EventType};
use spire_core::{
    Capability, EventId, KernelError, KernelResult, OverlayId, Timestamp,
};
use spire_sandbox::{Guest, HostApi, SandboxRuntime};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Invocation history retained for diagnostics
    pub history_capacity: usize,
    /// Circuit breaker thresholds applied per overlay
    pub breaker: BreakerConfig,
    /// Consecutive resource faults before an overlay is quarantined
    pub quarantine_resource_faults: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1_000,
            breaker: BreakerConfig::default(),
            quarantine_resource_faults: 3,
        }
    }
}

/// Registry snapshot of one overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayInfo {
    /// Overlay id
    pub id: OverlayId,
    /// Overlay name
    pub name: String,
    /// Overlay version
    pub version: String,
    /// Lifecycle state
    pub state: OverlayState,
    /// Whether the overlay rejects normal deactivation
    pub is_critical: bool,
}

/// One entry in the invocation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Overlay invoked
    pub overlay_id: OverlayId,
    /// Triggering event, if any
    pub event_id: Option<EventId>,
    /// Driving pipeline phase, if any
    pub phase: Option<String>,
    /// Whether the invocation succeeded
    pub success: bool,
    /// Fuel consumed
    pub fuel_consumed: u64,
    /// Wall time spent
    pub wall_time: Duration,
    /// Failure description, if any
    pub error: Option<String>,
    /// When the record was written
    pub recorded_at: Timestamp,
}

/// How one overlay invocation concluded
#[derive(Debug)]
pub enum InvocationOutcome {
    /// The overlay ran and succeeded
    Completed {
        /// Overlay output data
        output: Value,
        /// Fuel consumed
        fuel_consumed: u64,
        /// Wall time spent
        wall_time: Duration,
    },
    /// The circuit breaker short-circuited the call
    ShortCircuited,
    /// The cascade cycle gate refused the overlay
    CycleSkipped,
    /// The invocation failed
    Failed(KernelError),
}

/// Outcome of invoking one overlay
#[derive(Debug)]
pub struct OverlayOutcome {
    /// Overlay invoked
    pub overlay_id: OverlayId,
    /// How the invocation concluded
    pub outcome: InvocationOutcome,
}

struct OverlayEntry {
    descriptor: OverlayDescriptor,
    overlay: Arc<dyn Overlay>,
    state: OverlayState,
    resource_faults: u32,
}

#[derive(Default)]
struct RegistryIndex {
    entries: IndexMap<OverlayId, OverlayEntry>,
    by_name: HashMap<String, OverlayId>,
    by_event_type: HashMap<EventType, BTreeSet<OverlayId>>,
    by_capability: HashMap<Capability, BTreeSet<OverlayId>>,
    by_phase: HashMap<String, Vec<OverlayId>>,
}

impl RegistryIndex {
    fn insert(&mut self, id: OverlayId, entry: OverlayEntry) {
        self.by_name.insert(entry.descriptor.name.clone(), id);
        for event_type in &entry.descriptor.subscribed_event_types {
            self.by_event_type
                .entry(event_type.clone())
                .or_default()
                .insert(id);
        }
        for capability in entry.descriptor.required_capabilities.iter() {
            self.by_capability.entry(*capability).or_default().insert(id);
        }
        for phase in &entry.descriptor.phases {
            self.by_phase.entry(phase.clone()).or_default().push(id);
        }
        self.entries.insert(id, entry);
    }

    fn remove(&mut self, id: OverlayId) -> Option<OverlayEntry> {
        let entry = self.entries.shift_remove(&id)?;
        self.by_name.remove(&entry.descriptor.name);
        for event_type in &entry.descriptor.subscribed_event_types {
            if let Some(ids) = self.by_event_type.get_mut(event_type) {
                ids.remove(&id);
            }
        }
        for capability in entry.descriptor.required_capabilities.iter() {
            if let Some(ids) = self.by_capability.get_mut(capability) {
                ids.remove(&id);
            }
        }
        for phase in &entry.descriptor.phases {
            if let Some(ids) = self.by_phase.get_mut(phase) {
                ids.retain(|oid| *oid != id);
            }
        }
        Some(entry)
    }
}

/// Snapshot taken under the read lock before any await
struct EntrySnapshot {
    id: OverlayId,
    overlay: Arc<dyn Overlay>,
    descriptor: OverlayDescriptor,
}

/// The overlay registry and manager
pub struct OverlayManager {
    config: ManagerConfig,
    index: RwLock<RegistryIndex>,
    breakers: Mutex<HashMap<OverlayId, Arc<CircuitBreaker>>>,
    runtime: Arc<SandboxRuntime>,
    bus: Arc<EventBus>,
    history: Mutex<VecDeque<InvocationRecord>>,
}

impl OverlayManager {
    /// Create a manager over a sandbox runtime and the event bus
    #[must_use]
    pub fn new(config: ManagerConfig, runtime: Arc<SandboxRuntime>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            index: RwLock::new(RegistryIndex::default()),
            breakers: Mutex::new(HashMap::new()),
            runtime,
            bus,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Register an overlay
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` for a duplicate name.
    pub fn register(
        &self,
        descriptor: OverlayDescriptor,
        overlay: Arc<dyn Overlay>,
    ) -> KernelResult<OverlayId> {
        let mut index = self.index.write().unwrap();
        if index.by_name.contains_key(&descriptor.name) {
            return Err(KernelError::AlreadyExists {
                kind: "Overlay".to_string(),
                id: descriptor.name,
            });
        }
        let id = OverlayId::new();
        let name = descriptor.name.clone();
        index.insert(
            id,
            OverlayEntry {
                descriptor,
                overlay,
                state: OverlayState::Registered,
                resource_faults: 0,
            },
        );
        drop(index);
        tracing::info!(overlay = %id, name = %name, "overlay registered");
        Ok(id)
    }

    /// Activate an overlay, running its `initialize`
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PolicyDenied` for quarantined overlays
    /// (use [`OverlayManager::activate_override`]), `InvalidState` for
    /// an in-flight activation, or the overlay's initialization error.
    pub async fn activate(&self, id: OverlayId) -> KernelResult<()> {
        let overlay = {
            let mut index = self.index.write().unwrap();
            let entry = index.entries.get_mut(&id).ok_or_else(|| not_found(id))?;
            match entry.state {
                OverlayState::Active => return Ok(()),
                OverlayState::Inactive => {
                    entry.state = OverlayState::Active;
                    tracing::info!(overlay = %id, "overlay reactivated");
                    return Ok(());
                }
                OverlayState::Registered => {
                    entry.state = OverlayState::Loading;
                    Arc::clone(&entry.overlay)
                }
                OverlayState::Loading => {
                    return Err(KernelError::InvalidState {
                        expected: "Registered or Inactive".to_string(),
                        actual: "Loading".to_string(),
                    });
                }
                OverlayState::Quarantined => {
                    return Err(KernelError::PolicyDenied {
                        operation: "activate".to_string(),
                        reason: "overlay is quarantined; administrative override required"
                            .to_string(),
                    });
                }
            }
        };

        match overlay.initialize().await {
            Ok(true) => {
                self.set_state(id, OverlayState::Active);
                tracing::info!(overlay = %id, "overlay activated");
                Ok(())
            }
            Ok(false) => {
                self.set_state(id, OverlayState::Registered);
                Err(KernelError::OverlayFailure {
                    overlay: id.to_string(),
                    reason: "initialization rejected activation".to_string(),
                })
            }
            Err(err) => {
                self.set_state(id, OverlayState::Registered);
                Err(err)
            }
        }
    }

    /// Administrative activation: additionally lifts quarantine
    ///
    /// # Errors
    ///
    /// As [`OverlayManager::activate`], minus the quarantine gate.
    pub async fn activate_override(&self, id: OverlayId) -> KernelResult<()> {
        {
            let mut index = self.index.write().unwrap();
            let entry = index.entries.get_mut(&id).ok_or_else(|| not_found(id))?;
            if entry.state == OverlayState::Quarantined {
                entry.state = OverlayState::Active;
                entry.resource_faults = 0;
                tracing::warn!(overlay = %id, "quarantine lifted by administrative override");
                return Ok(());
            }
        }
        self.activate(id).await
    }

    /// Deactivate an overlay
    ///
    /// # Errors
    ///
    /// Returns `PolicyDenied` for critical overlays; use
    /// [`OverlayManager::deactivate_override`].
    pub fn deactivate(&self, id: OverlayId) -> KernelResult<()> {
        let mut index = self.index.write().unwrap();
        let entry = index.entries.get_mut(&id).ok_or_else(|| not_found(id))?;
        if entry.descriptor.is_critical {
            return Err(KernelError::PolicyDenied {
                operation: "deactivate".to_string(),
                reason: format!("overlay {} is critical", entry.descriptor.name),
            });
        }
        deactivate_entry(id, entry)
    }

    /// Administrative deactivation: applies to critical overlays too
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `InvalidState`.
    pub fn deactivate_override(&self, id: OverlayId) -> KernelResult<()> {
        let mut index = self.index.write().unwrap();
        let entry = index.entries.get_mut(&id).ok_or_else(|| not_found(id))?;
        deactivate_entry(id, entry)
    }

    /// Deregister an overlay, running its `cleanup`
    ///
    /// # Errors
    ///
    /// Returns `PolicyDenied` for critical overlays; use
    /// [`OverlayManager::deregister_override`].
    pub async fn deregister(&self, id: OverlayId) -> KernelResult<()> {
        {
            let index = self.index.read().unwrap();
            let entry = index.entries.get(&id).ok_or_else(|| not_found(id))?;
            if entry.descriptor.is_critical {
                return Err(KernelError::PolicyDenied {
                    operation: "deregister".to_string(),
                    reason: format!("overlay {} is critical", entry.descriptor.name),
                });
            }
        }
        self.deregister_override(id).await
    }

    /// Administrative deregistration: applies to critical overlays too
    ///
    /// # Errors
    ///
    /// Returns `NotFound`.
    pub async fn deregister_override(&self, id: OverlayId) -> KernelResult<()> {
        let entry = {
            let mut index = self.index.write().unwrap();
            index.remove(id).ok_or_else(|| not_found(id))?
        };
        self.breakers.lock().unwrap().remove(&id);
        entry.overlay.cleanup().await;
        tracing::info!(overlay = %id, name = %entry.descriptor.name, "overlay deregistered");
        Ok(())
    }

    /// Route an event to every matching ACTIVE overlay, concurrently
    pub async fn route_event(&self, event: &Event) -> Vec<OverlayOutcome> {
        let candidates: Vec<OverlayId> = {
            let index = self.index.read().unwrap();
            index
                .by_event_type
                .get(&event.event_type)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| {
                            index
                                .entries
                                .get(*id)
                                .map(|e| e.state == OverlayState::Active)
                                .unwrap_or(false)
                        })
                        .copied()
                        .collect()
                })
                .unwrap_or_default()
        };

        let invocations = candidates
            .iter()
            .map(|id| self.invoke(*id, Some(event), Value::Null, None));
        futures::future::join_all(invocations).await
    }

    /// Invoke one overlay through its breaker and the sandbox
    pub async fn invoke(
        &self,
        id: OverlayId,
        event: Option<&Event>,
        input: Value,
        phase: Option<&str>,
    ) -> OverlayOutcome {
        let snapshot = {
            let index = self.index.read().unwrap();
            match index.entries.get(&id) {
                Some(entry) if entry.state == OverlayState::Active => EntrySnapshot {
                    id,
                    overlay: Arc::clone(&entry.overlay),
                    descriptor: entry.descriptor.clone(),
                },
                Some(entry) => {
                    return OverlayOutcome {
                        overlay_id: id,
                        outcome: InvocationOutcome::Failed(KernelError::InvalidState {
                            expected: "Active".to_string(),
                            actual: entry.state.to_string(),
                        }),
                    };
                }
                None => {
                    return OverlayOutcome {
                        overlay_id: id,
                        outcome: InvocationOutcome::Failed(not_found(id)),
                    };
                }
            }
        };

        let breaker = self.breaker_for(id);
        if !breaker.try_acquire() {
            return OverlayOutcome {
                overlay_id: id,
                outcome: InvocationOutcome::ShortCircuited,
            };
        }

        // Cascade cycle gate, checked last so a short-circuited call
        // does not count as a visit
        if let Some(chain_id) = event.and_then(|e| e.chain_id) {
            if !self.bus.mark_visited(chain_id, id) {
                tracing::debug!(overlay = %id, chain = %chain_id, "cycle gate skipped overlay");
                return OverlayOutcome {
                    overlay_id: id,
                    outcome: InvocationOutcome::CycleSkipped,
                };
            }
        }

        let outcome = self.invoke_snapshot(snapshot, &breaker, event, input, phase).await;
        OverlayOutcome {
            overlay_id: id,
            outcome,
        }
    }

    async fn invoke_snapshot(
        &self,
        snapshot: EntrySnapshot,
        breaker: &CircuitBreaker,
        event: Option<&Event>,
        input: Value,
        phase: Option<&str>,
    ) -> InvocationOutcome {
        let id = snapshot.id;
        let instance = match self.runtime.load(
            id,
            snapshot.descriptor.required_capabilities.clone(),
            &snapshot.descriptor.manifest,
        ) {
            Ok(instance) => instance,
            Err(err) => {
                breaker.record_failure();
                if err.is_security_fault() {
                    self.quarantine(id, "sandbox load refused");
                }
                self.record(id, event, phase, false, 0, Duration::ZERO, Some(&err));
                return InvocationOutcome::Failed(err);
            }
        };

        let guest = Arc::new(OverlayGuest {
            overlay_id: id,
            overlay: snapshot.overlay,
            phase: phase.map(str::to_string),
        });
        let exec = self
            .runtime
            .execute(&instance, guest, event.cloned(), input)
            .await;

        if exec.success {
            breaker.record_success();
            self.clear_resource_faults(id);
            self.forward_events(event, exec.emitted_events).await;
            self.record(
                id,
                event,
                phase,
                true,
                exec.fuel_consumed,
                exec.wall_time,
                None,
            );
            InvocationOutcome::Completed {
                output: exec.output,
                fuel_consumed: exec.fuel_consumed,
                wall_time: exec.wall_time,
            }
        } else {
            let err = exec.error.unwrap_or(KernelError::OverlayFailure {
                overlay: id.to_string(),
                reason: "execution failed without error detail".to_string(),
            });
            breaker.record_failure();
            if err.is_security_fault() {
                self.quarantine(id, "security fault");
            } else if err.is_resource_fault() && self.bump_resource_faults(id) {
                self.quarantine(id, "repeated resource faults");
            }
            self.record(
                id,
                event,
                phase,
                false,
                exec.fuel_consumed,
                exec.wall_time,
                Some(&err),
            );
            InvocationOutcome::Failed(err)
        }
    }

    /// Forward overlay-emitted events to the bus, continuing any chain
    async fn forward_events(&self, trigger: Option<&Event>, events: Vec<Event>) {
        let chain_id = trigger.and_then(|e| e.chain_id);
        for event in events {
            let result = match chain_id {
                Some(chain) => self.bus.propagate_cascade(chain, event).await.map(|_| 0),
                None => self.bus.publish(event),
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to forward overlay event");
            }
        }
    }

    /// Overlays in a given lifecycle state
    #[must_use]
    pub fn get_by_state(&self, state: OverlayState) -> Vec<OverlayId> {
        let index = self.index.read().unwrap();
        index
            .entries
            .iter()
            .filter(|(_, e)| e.state == state)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Overlays declaring a capability
    #[must_use]
    pub fn get_by_capability(&self, capability: Capability) -> Vec<OverlayId> {
        let index = self.index.read().unwrap();
        index
            .by_capability
            .get(&capability)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// ACTIVE overlays registered for a phase, in registration order
    #[must_use]
    pub fn overlays_for_phase(&self, phase: &str) -> Vec<OverlayId> {
        let index = self.index.read().unwrap();
        index
            .by_phase
            .get(phase)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        index
                            .entries
                            .get(*id)
                            .map(|e| e.state == OverlayState::Active)
                            .unwrap_or(false)
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up an overlay id by name
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<OverlayId> {
        self.index.read().unwrap().by_name.get(name).copied()
    }

    /// Registry snapshot of one overlay
    #[must_use]
    pub fn info(&self, id: OverlayId) -> Option<OverlayInfo> {
        let index = self.index.read().unwrap();
        index.entries.get(&id).map(|entry| OverlayInfo {
            id,
            name: entry.descriptor.name.clone(),
            version: entry.descriptor.version.clone(),
            state: entry.state,
            is_critical: entry.descriptor.is_critical,
        })
    }

    /// Registry snapshot of all overlays, in registration order
    #[must_use]
    pub fn list(&self) -> Vec<OverlayInfo> {
        let index = self.index.read().unwrap();
        index
            .entries
            .iter()
            .map(|(id, entry)| OverlayInfo {
                id: *id,
                name: entry.descriptor.name.clone(),
                version: entry.descriptor.version.clone(),
                state: entry.state,
                is_critical: entry.descriptor.is_critical,
            })
            .collect()
    }

    /// Health of every registered overlay
    pub async fn health_snapshot(&self) -> BTreeMap<OverlayId, OverlayHealth> {
        let snapshots: Vec<(OverlayId, String, OverlayState, Arc<dyn Overlay>)> = {
            let index = self.index.read().unwrap();
            index
                .entries
                .iter()
                .map(|(id, e)| {
                    (
                        *id,
                        e.descriptor.name.clone(),
                        e.state,
                        Arc::clone(&e.overlay),
                    )
                })
                .collect()
        };

        let checks = snapshots
            .iter()
            .map(|(_, _, _, overlay)| overlay.health_check());
        let statuses = futures::future::join_all(checks).await;

        let breakers = self.breakers.lock().unwrap();
        snapshots
            .into_iter()
            .zip(statuses)
            .map(|((id, name, state, _), status)| {
                (
                    id,
                    OverlayHealth {
                        name,
                        state,
                        status,
                        breaker: breakers.get(&id).map(|b| b.snapshot()),
                    },
                )
            })
            .collect()
    }

    /// Manually reset an overlay's circuit breaker
    ///
    /// Returns `false` if no breaker exists yet for the overlay.
    pub fn reset_breaker(&self, id: OverlayId) -> bool {
        let breakers = self.breakers.lock().unwrap();
        match breakers.get(&id) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Breaker snapshots for every overlay with breaker state
    #[must_use]
    pub fn breaker_snapshots(&self) -> BTreeMap<OverlayId, BreakerSnapshot> {
        self.breakers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, b)| (*id, b.snapshot()))
            .collect()
    }

    /// Invocation history, oldest first
    #[must_use]
    pub fn execution_history(&self) -> Vec<InvocationRecord> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    fn breaker_for(&self, id: OverlayId) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        Arc::clone(
            breakers
                .entry(id)
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.breaker.clone()))),
        )
    }

    fn set_state(&self, id: OverlayId, state: OverlayState) {
        let mut index = self.index.write().unwrap();
        if let Some(entry) = index.entries.get_mut(&id) {
            entry.state = state;
        }
    }

    fn quarantine(&self, id: OverlayId, reason: &str) {
        let mut index = self.index.write().unwrap();
        if let Some(entry) = index.entries.get_mut(&id) {
            if entry.state.can_transition(OverlayState::Quarantined) {
                entry.state = OverlayState::Quarantined;
                tracing::error!(overlay = %id, reason, "overlay quarantined");
            }
        }
    }

    fn bump_resource_faults(&self, id: OverlayId) -> bool {
        let mut index = self.index.write().unwrap();
        match index.entries.get_mut(&id) {
            Some(entry) => {
                entry.resource_faults += 1;
                entry.resource_faults >= self.config.quarantine_resource_faults
            }
            None => false,
        }
    }

    fn clear_resource_faults(&self, id: OverlayId) {
        let mut index = self.index.write().unwrap();
        if let Some(entry) = index.entries.get_mut(&id) {
            entry.resource_faults = 0;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        overlay_id: OverlayId,
        event: Option<&Event>,
        phase: Option<&str>,
        success: bool,
        fuel_consumed: u64,
        wall_time: Duration,
        error: Option<&KernelError>,
    ) {
        let mut history = self.history.lock().unwrap();
        while history.len() >= self.config.history_capacity.max(1) {
            history.pop_front();
        }
        history.push_back(InvocationRecord {
            overlay_id,
            event_id: event.map(|e| e.id),
            phase: phase.map(str::to_string),
            success,
            fuel_consumed,
            wall_time,
            error: error.map(ToString::to_string),
            recorded_at: Timestamp::now(),
        });
    }
}

fn not_found(id: OverlayId) -> KernelError {
    KernelError::NotFound {
        kind: "Overlay".to_string(),
        id: id.to_string(),
    }
}

fn deactivate_entry(id: OverlayId, entry: &mut OverlayEntry) -> KernelResult<()> {
    match entry.state {
        OverlayState::Inactive => Ok(()),
        OverlayState::Active => {
            entry.state = OverlayState::Inactive;
            tracing::info!(overlay = %id, "overlay deactivated");
            Ok(())
        }
        state => Err(KernelError::InvalidState {
            expected: "Active".to_string(),
            actual: state.to_string(),
        }),
    }
}

/// Adapts the overlay contract to the sandbox guest contract
struct OverlayGuest {
    overlay_id: OverlayId,
    overlay: Arc<dyn Overlay>,
    phase: Option<String>,
}

#[async_trait]
impl Guest for OverlayGuest {
    async fn run(
        &self,
        host: Arc<HostApi>,
        event: Option<Event>,
        input: Value,
    ) -> KernelResult<Value> {
        let ctx = OverlayContext {
            overlay_id: self.overlay_id,
            phase: self.phase.clone(),
            chain_id: event.as_ref().and_then(|e| e.chain_id),
            host: Arc::clone(&host),
        };
        let result: OverlayResult = self.overlay.execute(&ctx, event.as_ref(), input).await?;

        // Emission is capability-gated and fuel-metered like any other
        // host access
        for emitted in result.events_to_emit {
            host.event_publish(emitted)?;
        }
        if !result.metrics.is_empty() {
            tracing::trace!(overlay = %self.overlay_id, metrics = ?result.metrics, "overlay metrics");
        }

        if result.success {
            Ok(result.data)
        } else {
            Err(KernelError::OverlayFailure {
                overlay: self.overlay_id.to_string(),
                reason: result
                    .error
                    .unwrap_or_else(|| "overlay reported failure".to_string()),
            })
        }
    }
}
