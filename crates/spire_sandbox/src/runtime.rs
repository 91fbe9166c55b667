//! The sandbox runtime: per-invocation instances with enforced budgets.
//!
//! One [`SandboxInstance`] exists per invocation and is destroyed at
//! invocation end. The runtime enforces the wall-clock deadline and the
//! trusted-mode load gate; fuel and memory are enforced by the host
//! surface the guest calls through.

use crate::host::{HostApi, HostCallStats, HostCosts, StoreAccess};
use crate::mode::SecurityMode;
use crate::{FuelMeter, MemoryMeter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spire_bus::Event;
use spire_core::{
    CapabilitySet, KernelError, KernelResult, OverlayId, ResourceFaultKind, Timestamp,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-overlay execution budgets and security posture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxManifest {
    /// Fuel budget per invocation
    pub fuel_budget: u64,
    /// Memory limit in bytes per invocation
    pub memory_limit: u64,
    /// Wall-clock deadline per invocation
    pub wall_clock_limit: Duration,
    /// Isolation mode
    pub security_mode: SecurityMode,
    /// Declared by internal overlays that may request trusted mode
    pub is_internal_trusted: bool,
}

impl SandboxManifest {
    /// Create a manifest with default budgets
    #[must_use]
    pub fn new() -> Self {
        Self {
            fuel_budget: 1_000_000,
            memory_limit: 16 * 1024 * 1024,
            wall_clock_limit: Duration::from_secs(5),
            security_mode: SecurityMode::Strict,
            is_internal_trusted: false,
        }
    }

    /// Set the fuel budget
    #[must_use]
    pub fn with_fuel_budget(mut self, fuel: u64) -> Self {
        self.fuel_budget = fuel;
        self
    }

    /// Set the memory limit
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Set the wall-clock deadline
    #[must_use]
    pub fn with_wall_clock_limit(mut self, limit: Duration) -> Self {
        self.wall_clock_limit = limit;
        self
    }

    /// Set the security mode
    #[must_use]
    pub fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    /// Declare the overlay internally trusted
    #[must_use]
    pub fn with_internal_trusted(mut self, trusted: bool) -> Self {
        self.is_internal_trusted = trusted;
        self
    }
}

impl Default for SandboxManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime-level configuration
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Whether trusted in-process execution may be granted at all
    pub allow_trusted: bool,
    /// Fuel cost of each host function
    pub costs: HostCosts,
}

/// Lifecycle of one sandbox instance
///
/// `Terminated` is terminal: once entered it is never left, and it is
/// entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Loaded, not yet executing
    Ready,
    /// Executing
    Running,
    /// Execution completed (successfully or not)
    Finished,
    /// Terminated by the runtime or an operator
    Terminated,
}

/// One overlay invocation's execution context
#[derive(Debug)]
pub struct SandboxInstance {
    /// Overlay being invoked
    pub overlay_id: OverlayId,
    manifest: SandboxManifest,
    capabilities: CapabilitySet,
    fuel: Arc<Mutex<FuelMeter>>,
    memory: Arc<Mutex<MemoryMeter>>,
    cancel: CancellationToken,
    state: Mutex<InstanceState>,
    /// When the instance was loaded
    pub loaded_at: Timestamp,
}

impl SandboxInstance {
    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> InstanceState {
        *self.state.lock().unwrap()
    }

    /// Fuel consumed so far
    #[must_use]
    pub fn fuel_consumed(&self) -> u64 {
        self.fuel.lock().unwrap().consumed()
    }

    /// Peak memory over the invocation
    #[must_use]
    pub fn peak_memory(&self) -> u64 {
        self.memory.lock().unwrap().peak()
    }

    /// The manifest this instance was loaded with
    #[must_use]
    pub fn manifest(&self) -> &SandboxManifest {
        &self.manifest
    }

    /// Transition to the terminal state; returns `true` exactly once
    pub fn terminate(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == InstanceState::Terminated {
            return false;
        }
        *state = InstanceState::Terminated;
        drop(state);
        self.cancel.cancel();
        true
    }

    fn begin(&self) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        if *state != InstanceState::Ready {
            return Err(KernelError::InvalidState {
                expected: "Ready".to_string(),
                actual: format!("{:?}", *state),
            });
        }
        *state = InstanceState::Running;
        Ok(())
    }

    fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        // Terminated is terminal; never overwrite it
        if *state == InstanceState::Running {
            *state = InstanceState::Finished;
        }
    }
}

/// Guest code executed inside the sandbox
///
/// All host access goes through the provided [`HostApi`]; the guest has
/// no other ambient capability.
#[async_trait]
pub trait Guest: Send + Sync {
    /// Run the guest to completion
    async fn run(
        &self,
        host: Arc<HostApi>,
        event: Option<Event>,
        input: Value,
    ) -> KernelResult<Value>;
}

/// Outcome of one sandboxed invocation
///
/// `emitted_events` is populated only for successful invocations; an
/// aborted invocation forwards nothing.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Whether the guest completed successfully
    pub success: bool,
    /// Guest output
    pub output: Value,
    /// Failure, if any
    pub error: Option<KernelError>,
    /// Fuel consumed
    pub fuel_consumed: u64,
    /// Peak memory in bytes
    pub peak_memory: u64,
    /// Wall time spent
    pub wall_time: Duration,
    /// Events buffered by the guest through `event_publish`
    pub emitted_events: Vec<Event>,
    /// Host call counters
    pub host_calls: HostCallStats,
}

/// The sandbox runtime
pub struct SandboxRuntime {
    config: RuntimeConfig,
    store: Arc<dyn StoreAccess>,
}

impl SandboxRuntime {
    /// Create a runtime over a store collaborator
    #[must_use]
    pub fn new(config: RuntimeConfig, store: Arc<dyn StoreAccess>) -> Self {
        Self { config, store }
    }

    /// Load a sandbox instance for one invocation
    ///
    /// # Errors
    ///
    /// Returns a security fault when trusted in-process mode is
    /// requested without both the manifest declaration and the runtime
    /// configuration allowing it.
    pub fn load(
        &self,
        overlay_id: OverlayId,
        capabilities: CapabilitySet,
        manifest: &SandboxManifest,
    ) -> KernelResult<SandboxInstance> {
        if manifest.security_mode == SecurityMode::TrustedInprocess
            && !(manifest.is_internal_trusted && self.config.allow_trusted)
        {
            tracing::error!(
                overlay = %overlay_id,
                manifest_trusted = manifest.is_internal_trusted,
                runtime_allows = self.config.allow_trusted,
                "trusted in-process mode refused"
            );
            return Err(KernelError::SecurityFault {
                operation: "load".to_string(),
                reason: "trusted in-process mode requires both a trusted manifest \
                         and a runtime configured to allow it"
                    .to_string(),
            });
        }

        Ok(SandboxInstance {
            overlay_id,
            capabilities,
            fuel: Arc::new(Mutex::new(FuelMeter::new(manifest.fuel_budget))),
            memory: Arc::new(Mutex::new(MemoryMeter::new(manifest.memory_limit))),
            cancel: CancellationToken::new(),
            state: Mutex::new(InstanceState::Ready),
            loaded_at: Timestamp::now(),
            manifest: manifest.clone(),
        })
    }

    /// Execute a guest inside an instance
    ///
    /// Safe to race with [`SandboxInstance::terminate`]; a terminated
    /// invocation reports `Cancelled`.
    pub async fn execute(
        &self,
        instance: &SandboxInstance,
        guest: Arc<dyn Guest>,
        event: Option<Event>,
        input: Value,
    ) -> ExecutionResult {
        if let Err(err) = instance.begin() {
            return self.result_for(instance, Err(err), Duration::ZERO, None);
        }

        let host = Arc::new(
            HostApi::new(
                instance.overlay_id,
                instance.capabilities.clone(),
                instance.manifest.security_mode,
                Arc::clone(&instance.fuel),
                Arc::clone(&instance.memory),
                Arc::clone(&self.store),
            )
            .with_costs(self.config.costs),
        );

        let started = Instant::now();
        let limit = instance.manifest.wall_clock_limit;
        let outcome = tokio::select! {
            _ = instance.cancel.cancelled() => Err(KernelError::Cancelled),
            run = tokio::time::timeout(limit, guest.run(Arc::clone(&host), event, input)) => {
                match run {
                    Ok(result) => result,
                    Err(_) => Err(KernelError::ResourceFault {
                        fault: ResourceFaultKind::WallClock,
                        detail: format!("deadline {}ms exceeded", limit.as_millis()),
                    }),
                }
            }
        };
        instance.finish();

        self.result_for(instance, outcome, started.elapsed(), Some(host))
    }

    /// Terminate an instance; safe to call concurrently with an
    /// in-flight `execute`. Returns `true` exactly once.
    pub fn terminate(&self, instance: &SandboxInstance) -> bool {
        let first = instance.terminate();
        if first {
            tracing::warn!(overlay = %instance.overlay_id, "sandbox instance terminated");
        }
        first
    }

    fn result_for(
        &self,
        instance: &SandboxInstance,
        outcome: KernelResult<Value>,
        wall_time: Duration,
        host: Option<Arc<HostApi>>,
    ) -> ExecutionResult {
        let fuel_consumed = instance.fuel_consumed();
        let peak_memory = instance.peak_memory();
        match outcome {
            Ok(output) => ExecutionResult {
                success: true,
                output,
                error: None,
                fuel_consumed,
                peak_memory,
                wall_time,
                emitted_events: host.as_ref().map(|h| h.take_emitted()).unwrap_or_default(),
                host_calls: host.map(|h| h.stats()).unwrap_or_default(),
            },
            Err(err) => {
                match &err {
                    e if e.is_security_fault() => {
                        tracing::error!(overlay = %instance.overlay_id, error = %e, "sandbox security fault");
                    }
                    e if e.is_resource_fault() => {
                        tracing::warn!(overlay = %instance.overlay_id, error = %e, "sandbox resource fault");
                    }
                    e => {
                        tracing::debug!(overlay = %instance.overlay_id, error = %e, "sandbox execution failed");
                    }
                }
                ExecutionResult {
                    success: false,
                    output: Value::Null,
                    error: Some(err),
                    fuel_consumed,
                    peak_memory,
                    wall_time,
                    emitted_events: Vec::new(),
                    host_calls: host.map(|h| h.stats()).unwrap_or_default(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spire_core::Capability;

    struct EchoStore;

    #[async_trait]
    impl StoreAccess for EchoStore {
        async fn read(&self, query: &str) -> KernelResult<Value> {
            Ok(json!({"query": query}))
        }

        async fn write(&self, _query: &str) -> KernelResult<Value> {
            Ok(json!({"acknowledged": true}))
        }
    }

    fn make_runtime(allow_trusted: bool) -> SandboxRuntime {
        SandboxRuntime::new(
            RuntimeConfig {
                allow_trusted,
                costs: HostCosts::default(),
            },
            Arc::new(EchoStore),
        )
    }

    struct EchoGuest;

    #[async_trait]
    impl Guest for EchoGuest {
        async fn run(
            &self,
            host: Arc<HostApi>,
            _event: Option<Event>,
            input: Value,
        ) -> KernelResult<Value> {
            host.log("running")?;
            Ok(input)
        }
    }

    struct SleepyGuest(Duration);

    #[async_trait]
    impl Guest for SleepyGuest {
        async fn run(
            &self,
            _host: Arc<HostApi>,
            _event: Option<Event>,
            input: Value,
        ) -> KernelResult<Value> {
            tokio::time::sleep(self.0).await;
            Ok(input)
        }
    }

    struct HungryGuest;

    #[async_trait]
    impl Guest for HungryGuest {
        async fn run(
            &self,
            host: Arc<HostApi>,
            _event: Option<Event>,
            _input: Value,
        ) -> KernelResult<Value> {
            loop {
                host.store_read("MATCH (n) RETURN n").await?;
            }
        }
    }

    #[tokio::test]
    async fn test_execute_success() {
        let runtime = make_runtime(false);
        let manifest = SandboxManifest::new();
        let instance = runtime
            .load(OverlayId::new(), CapabilitySet::new(), &manifest)
            .unwrap();

        let result = runtime
            .execute(&instance, Arc::new(EchoGuest), None, json!({"x": 1}))
            .await;
        assert!(result.success);
        assert_eq!(result.output, json!({"x": 1}));
        assert!(result.fuel_consumed > 0);
        assert_eq!(result.host_calls.log_calls, 1);
        assert_eq!(instance.state(), InstanceState::Finished);
    }

    #[tokio::test]
    async fn test_trusted_mode_requires_both_keys() {
        let manifest = SandboxManifest::new()
            .with_security_mode(SecurityMode::TrustedInprocess)
            .with_internal_trusted(true);

        // Manifest alone is not sufficient
        let err = make_runtime(false)
            .load(OverlayId::new(), CapabilitySet::new(), &manifest)
            .unwrap_err();
        assert!(err.is_security_fault());

        // Runtime permission alone is not sufficient
        let untrusted = SandboxManifest::new()
            .with_security_mode(SecurityMode::TrustedInprocess);
        let err = make_runtime(true)
            .load(OverlayId::new(), CapabilitySet::new(), &untrusted)
            .unwrap_err();
        assert!(err.is_security_fault());

        // Both keys together load fine
        assert!(make_runtime(true)
            .load(OverlayId::new(), CapabilitySet::new(), &manifest)
            .is_ok());
    }

    #[tokio::test]
    async fn test_wall_clock_deadline() {
        let runtime = make_runtime(false);
        let manifest =
            SandboxManifest::new().with_wall_clock_limit(Duration::from_millis(20));
        let instance = runtime
            .load(OverlayId::new(), CapabilitySet::new(), &manifest)
            .unwrap();

        let result = runtime
            .execute(
                &instance,
                Arc::new(SleepyGuest(Duration::from_millis(500))),
                None,
                Value::Null,
            )
            .await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_ref().unwrap().resource_fault_kind(),
            Some(ResourceFaultKind::WallClock)
        );
    }

    #[tokio::test]
    async fn test_fuel_exhaustion_aborts_invocation() {
        let runtime = make_runtime(false);
        // Budget covers exactly three reads at cost 10
        let manifest = SandboxManifest::new().with_fuel_budget(30);
        let instance = runtime
            .load(
                OverlayId::new(),
                CapabilitySet::new().with(Capability::StoreRead),
                &manifest,
            )
            .unwrap();

        let result = runtime
            .execute(&instance, Arc::new(HungryGuest), None, Value::Null)
            .await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_ref().unwrap().resource_fault_kind(),
            Some(ResourceFaultKind::Fuel)
        );
        assert_eq!(result.host_calls.store_reads, 3);
        assert_eq!(result.fuel_consumed, 30);
        // Aborted invocations forward nothing
        assert!(result.emitted_events.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_races_with_execute() {
        let runtime = Arc::new(make_runtime(false));
        let manifest = SandboxManifest::new();
        let instance = Arc::new(
            runtime
                .load(OverlayId::new(), CapabilitySet::new(), &manifest)
                .unwrap(),
        );

        let exec_runtime = Arc::clone(&runtime);
        let exec_instance = Arc::clone(&instance);
        let task = tokio::spawn(async move {
            exec_runtime
                .execute(
                    &exec_instance,
                    Arc::new(SleepyGuest(Duration::from_secs(10))),
                    None,
                    Value::Null,
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(runtime.terminate(&instance));
        // Terminal state is entered exactly once
        assert!(!runtime.terminate(&instance));

        let result = task.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error, Some(KernelError::Cancelled));
        assert_eq!(instance.state(), InstanceState::Terminated);
    }

    #[tokio::test]
    async fn test_execute_after_terminate_is_invalid() {
        let runtime = make_runtime(false);
        let manifest = SandboxManifest::new();
        let instance = runtime
            .load(OverlayId::new(), CapabilitySet::new(), &manifest)
            .unwrap();

        runtime.terminate(&instance);
        let result = runtime
            .execute(&instance, Arc::new(EchoGuest), None, Value::Null)
            .await;
        assert!(!result.success);
        assert!(matches!(
            result.error,
            Some(KernelError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_emitted_events_forwarded_on_success() {
        struct EmittingGuest;

        #[async_trait]
        impl Guest for EmittingGuest {
            async fn run(
                &self,
                host: Arc<HostApi>,
                _event: Option<Event>,
                _input: Value,
            ) -> KernelResult<Value> {
                host.event_publish(Event::new("derived.event", Value::Null))?;
                Ok(Value::Null)
            }
        }

        let runtime = make_runtime(false);
        let manifest = SandboxManifest::new();
        let instance = runtime
            .load(
                OverlayId::new(),
                CapabilitySet::new().with(Capability::EventPublish),
                &manifest,
            )
            .unwrap();

        let result = runtime
            .execute(&instance, Arc::new(EmittingGuest), None, Value::Null)
            .await;
        assert!(result.success);
        assert_eq!(result.emitted_events.len(), 1);
        assert_eq!(result.emitted_events[0].event_type.as_str(), "derived.event");
    }
}
