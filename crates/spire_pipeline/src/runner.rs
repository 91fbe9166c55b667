//! The pipeline runner.
//!
//! Walks the configured phases strictly in order. Each phase attempt
//! runs under a hard deadline; a required phase that exhausts its retry
//! budget aborts the run, an optional one is skipped over with partial
//! data. Overlays within a sequential phase run in registration order;
//! a parallel phase joins all of its invocations before the next phase
//! starts.

use crate::execution::{ExecutionStatus, PhaseResult, PipelineExecution};
use crate::hooks::{PhaseHandler, PipelineHook};
use crate::phase::{default_configs, PhaseConfig};
use crate::Phase;
use serde_json::{Map, Value};
use spire_bus::Event;
use spire_core::{KernelError, KernelResult};
use spire_overlay::{InvocationOutcome, OverlayManager, OverlayOutcome};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Ordered phase policy table
    pub phases: Vec<PhaseConfig>,
    /// Completed runs retained for diagnostics
    pub history_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            phases: default_configs(),
            history_capacity: 100,
        }
    }
}

/// The phase pipeline
pub struct Pipeline {
    config: PipelineConfig,
    manager: Arc<OverlayManager>,
    hooks: RwLock<Vec<Arc<dyn PipelineHook>>>,
    handlers: RwLock<HashMap<Phase, Arc<dyn PhaseHandler>>>,
    history: Mutex<VecDeque<PipelineExecution>>,
}

impl Pipeline {
    /// Create a pipeline over an overlay manager
    #[must_use]
    pub fn new(config: PipelineConfig, manager: Arc<OverlayManager>) -> Self {
        Self {
            config,
            manager,
            hooks: RwLock::new(Vec::new()),
            handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Attach an observer hook
    pub fn add_hook(&self, hook: Arc<dyn PipelineHook>) {
        self.hooks.write().unwrap().push(hook);
    }

    /// Override a phase's overlay fan-out with a custom handler
    pub fn set_handler(&self, phase: Phase, handler: Arc<dyn PhaseHandler>) {
        self.handlers.write().unwrap().insert(phase, handler);
    }

    /// Run the pipeline over a unit of work
    pub async fn run(&self, initial_data: Value, trigger: Option<Event>) -> PipelineExecution {
        let mut execution = PipelineExecution::new(initial_data);
        tracing::info!(execution = %execution.execution_id, "pipeline run started");

        for (index, config) in self.config.phases.iter().enumerate() {
            execution.phase_index = index;
            self.emit_before(&execution, config.phase).await;

            let mut result = self
                .run_phase_with_retries(config, &execution, trigger.as_ref())
                .await;
            let failed = !result.success;
            if result.success {
                execution.merge(result.data.clone());
            } else if !config.required {
                result.skipped = true;
            }
            execution.per_phase_results.push(result);
            let result = execution.per_phase_results.last().expect("just pushed");
            self.emit_after(&execution, result).await;

            if failed {
                if config.required {
                    tracing::error!(
                        execution = %execution.execution_id,
                        phase = %config.phase,
                        "required phase failed; aborting run"
                    );
                    execution.status = ExecutionStatus::Failed(config.phase);
                    break;
                }
                tracing::warn!(
                    execution = %execution.execution_id,
                    phase = %config.phase,
                    "optional phase failed; continuing with partial data"
                );
            }
        }

        if execution.status == ExecutionStatus::Running {
            execution.status = ExecutionStatus::Completed;
        }
        execution.finished_at = Some(spire_core::Timestamp::now());
        self.emit_complete(&execution).await;
        self.push_history(execution.clone());
        tracing::info!(
            execution = %execution.execution_id,
            status = ?execution.status,
            "pipeline run finished"
        );
        execution
    }

    /// Completed runs, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<PipelineExecution> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    async fn run_phase_with_retries(
        &self,
        config: &PhaseConfig,
        execution: &PipelineExecution,
        trigger: Option<&Event>,
    ) -> PhaseResult {
        let started = Instant::now();
        let max_attempts = config.max_retries + 1;
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            attempts += 1;
            // The deadline is hard: an elapsed timeout drops the
            // attempt's in-flight invocations
            let attempt = tokio::time::timeout(
                config.timeout,
                self.run_phase_once(config, execution, trigger),
            );
            match attempt.await {
                Ok(Ok(data)) => {
                    return PhaseResult {
                        phase: config.phase,
                        success: true,
                        skipped: false,
                        attempts,
                        wall_time: started.elapsed(),
                        data,
                        error: None,
                    };
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        phase = %config.phase,
                        attempt = attempts,
                        error = %err,
                        "phase attempt failed"
                    );
                    last_error = Some(err.to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        phase = %config.phase,
                        attempt = attempts,
                        timeout_ms = config.timeout.as_millis() as u64,
                        "phase attempt timed out"
                    );
                    last_error = Some(format!(
                        "phase deadline {}ms exceeded",
                        config.timeout.as_millis()
                    ));
                }
            }
        }

        PhaseResult {
            phase: config.phase,
            success: false,
            skipped: false,
            attempts,
            wall_time: started.elapsed(),
            data: Value::Null,
            error: last_error,
        }
    }

    async fn run_phase_once(
        &self,
        config: &PhaseConfig,
        execution: &PipelineExecution,
        trigger: Option<&Event>,
    ) -> KernelResult<Value> {
        let handler = self.handlers.read().unwrap().get(&config.phase).cloned();
        if let Some(handler) = handler {
            return handler
                .run_phase(config.phase, &execution.merged_data, trigger)
                .await;
        }

        let ids = self.manager.overlays_for_phase(config.phase.name());
        if ids.is_empty() {
            return Ok(Value::Null);
        }

        let input = Value::Object(execution.merged_data.clone());
        let outcomes = if config.parallel {
            let invocations = ids.iter().map(|id| {
                self.manager
                    .invoke(*id, trigger, input.clone(), Some(config.phase.name()))
            });
            futures::future::join_all(invocations).await
        } else {
            let mut outcomes = Vec::with_capacity(ids.len());
            for id in &ids {
                outcomes.push(
                    self.manager
                        .invoke(*id, trigger, input.clone(), Some(config.phase.name()))
                        .await,
                );
            }
            outcomes
        };

        self.aggregate(config, outcomes)
    }

    fn aggregate(
        &self,
        config: &PhaseConfig,
        outcomes: Vec<OverlayOutcome>,
    ) -> KernelResult<Value> {
        let mut merged = Map::new();
        for OverlayOutcome {
            overlay_id,
            outcome,
        } in outcomes
        {
            match outcome {
                InvocationOutcome::Completed { output, .. } => match output {
                    Value::Object(map) => merged.extend(map),
                    Value::Null => {}
                    other => {
                        merged.insert(overlay_id.to_string(), other);
                    }
                },
                InvocationOutcome::ShortCircuited => {
                    tracing::debug!(
                        overlay = %overlay_id,
                        phase = %config.phase,
                        "overlay short-circuited by its breaker"
                    );
                }
                InvocationOutcome::CycleSkipped => {
                    tracing::debug!(
                        overlay = %overlay_id,
                        phase = %config.phase,
                        "overlay skipped by cascade cycle gate"
                    );
                }
                InvocationOutcome::Failed(err) => {
                    return Err(KernelError::PhaseFailure {
                        phase: config.phase.name().to_string(),
                        reason: format!("overlay {}: {}", overlay_id, err),
                    });
                }
            }
        }
        Ok(Value::Object(merged))
    }

    async fn emit_before(&self, execution: &PipelineExecution, phase: Phase) {
        let hooks: Vec<_> = self.hooks.read().unwrap().iter().cloned().collect();
        for hook in hooks {
            hook.before_phase(execution, phase).await;
        }
    }

    async fn emit_after(&self, execution: &PipelineExecution, result: &PhaseResult) {
        let hooks: Vec<_> = self.hooks.read().unwrap().iter().cloned().collect();
        for hook in hooks {
            hook.after_phase(execution, result).await;
        }
    }

    async fn emit_complete(&self, execution: &PipelineExecution) {
        let hooks: Vec<_> = self.hooks.read().unwrap().iter().cloned().collect();
        for hook in hooks {
            hook.on_complete(execution).await;
        }
    }

    fn push_history(&self, execution: PipelineExecution) {
        let mut history = self.history.lock().unwrap();
        while history.len() >= self.config.history_capacity.max(1) {
            history.pop_front();
        }
        history.push_back(execution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use spire_bus::BusConfig;
    use spire_bus::EventBus;
    use spire_overlay::{
        HealthStatus, ManagerConfig, Overlay, OverlayContext, OverlayDescriptor, OverlayResult,
    };
    use spire_sandbox::{RuntimeConfig, SandboxRuntime, StoreAccess};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct NullStore;

    #[async_trait]
    impl StoreAccess for NullStore {
        async fn read(&self, _query: &str) -> KernelResult<Value> {
            Ok(Value::Null)
        }

        async fn write(&self, _query: &str) -> KernelResult<Value> {
            Ok(Value::Null)
        }
    }

    fn make_manager() -> Arc<OverlayManager> {
        let bus = Arc::new(EventBus::new(BusConfig {
            poll_interval: Duration::from_millis(20),
            ..BusConfig::default()
        }));
        let runtime = Arc::new(SandboxRuntime::new(
            RuntimeConfig::default(),
            Arc::new(NullStore),
        ));
        Arc::new(OverlayManager::new(ManagerConfig::default(), runtime, bus))
    }

    async fn add_overlay(
        manager: &OverlayManager,
        name: &str,
        phase: Phase,
        overlay: Arc<dyn Overlay>,
    ) {
        let id = manager
            .register(
                OverlayDescriptor::new(name, "1.0.0").in_phase(phase.name()),
                overlay,
            )
            .unwrap();
        manager.activate(id).await.unwrap();
    }

    /// Contributes a fixed key/value to the phase output
    struct EmitOverlay {
        key: &'static str,
        value: Value,
    }

    #[async_trait]
    impl Overlay for EmitOverlay {
        async fn initialize(&self) -> KernelResult<bool> {
            Ok(true)
        }

        async fn execute(
            &self,
            _ctx: &OverlayContext,
            _event: Option<&Event>,
            _input: Value,
        ) -> KernelResult<OverlayResult> {
            let mut data = Map::new();
            data.insert(self.key.to_string(), self.value.clone());
            Ok(OverlayResult::success(Value::Object(data)))
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }

        async fn cleanup(&self) {}
    }

    /// Fails the first `fail_times` invocations, then succeeds
    struct FlakyOverlay {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl FlakyOverlay {
        fn new(fail_times: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_times,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Overlay for FlakyOverlay {
        async fn initialize(&self) -> KernelResult<bool> {
            Ok(true)
        }

        async fn execute(
            &self,
            _ctx: &OverlayContext,
            _event: Option<&Event>,
            _input: Value,
        ) -> KernelResult<OverlayResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                Ok(OverlayResult::failure("not yet"))
            } else {
                Ok(OverlayResult::success(json!({"flaky": call})))
            }
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }

        async fn cleanup(&self) {}
    }

    /// Records the input it was handed
    struct CaptureOverlay {
        seen: Mutex<Option<Value>>,
        calls: AtomicU32,
    }

    impl CaptureOverlay {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(None),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Overlay for CaptureOverlay {
        async fn initialize(&self) -> KernelResult<bool> {
            Ok(true)
        }

        async fn execute(
            &self,
            _ctx: &OverlayContext,
            _event: Option<&Event>,
            input: Value,
        ) -> KernelResult<OverlayResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(input);
            Ok(OverlayResult::success(Value::Null))
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }

        async fn cleanup(&self) {}
    }

    struct SlowOverlay(Duration);

    #[async_trait]
    impl Overlay for SlowOverlay {
        async fn initialize(&self) -> KernelResult<bool> {
            Ok(true)
        }

        async fn execute(
            &self,
            _ctx: &OverlayContext,
            _event: Option<&Event>,
            _input: Value,
        ) -> KernelResult<OverlayResult> {
            tokio::time::sleep(self.0).await;
            Ok(OverlayResult::success(Value::Null))
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }

        async fn cleanup(&self) {}
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes() {
        let pipeline = Pipeline::new(PipelineConfig::default(), make_manager());
        let execution = pipeline.run(Value::Null, None).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.per_phase_results.len(), Phase::ALL.len());
        assert!(execution.per_phase_results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_optional_failure_continues_required_failure_aborts() {
        // Phases: A required, B optional, C required
        let config = PipelineConfig {
            phases: vec![
                PhaseConfig::new(Phase::Validation).required(),
                PhaseConfig::new(Phase::Consensus),
                PhaseConfig::new(Phase::Execution).required(),
            ],
            history_capacity: 10,
        };
        let manager = make_manager();
        let tail = CaptureOverlay::new();
        add_overlay(&manager, "broken", Phase::Consensus, FlakyOverlay::new(u32::MAX)).await;
        add_overlay(&manager, "tail", Phase::Execution, tail.clone()).await;

        // B fails, C still executes
        let pipeline = Pipeline::new(config.clone(), Arc::clone(&manager));
        let execution = pipeline.run(Value::Null, None).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(tail.calls.load(Ordering::SeqCst), 1);
        let consensus = &execution.per_phase_results[1];
        assert!(!consensus.success);
        assert!(consensus.skipped);

        // A fails: neither B nor C executes
        add_overlay(&manager, "gate", Phase::Validation, FlakyOverlay::new(u32::MAX)).await;
        let pipeline = Pipeline::new(config, manager);
        let execution = pipeline.run(Value::Null, None).await;
        assert_eq!(execution.status, ExecutionStatus::Failed(Phase::Validation));
        assert_eq!(execution.per_phase_results.len(), 1);
        assert_eq!(execution.failed_phase(), Some(Phase::Validation));
        assert_eq!(tail.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_phases_see_earlier_outputs() {
        let config = PipelineConfig {
            phases: vec![
                PhaseConfig::new(Phase::Ingestion).required(),
                PhaseConfig::new(Phase::Analysis).required(),
            ],
            history_capacity: 10,
        };
        let manager = make_manager();
        let capture = CaptureOverlay::new();
        add_overlay(
            &manager,
            "emitter",
            Phase::Ingestion,
            Arc::new(EmitOverlay {
                key: "score",
                value: json!(0.7),
            }),
        )
        .await;
        add_overlay(&manager, "capture", Phase::Analysis, capture.clone()).await;

        let pipeline = Pipeline::new(config, manager);
        let execution = pipeline.run(json!({"seed": 1}), None).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.merged_data.get("score"), Some(&json!(0.7)));
        assert_eq!(execution.merged_data.get("seed"), Some(&json!(1)));

        let seen = capture.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("score"), Some(&json!(0.7)));
        assert_eq!(seen.get("seed"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_retry_budget_recovers_flaky_phase() {
        let config = PipelineConfig {
            phases: vec![PhaseConfig::new(Phase::Validation)
                .required()
                .with_max_retries(2)],
            history_capacity: 10,
        };
        let manager = make_manager();
        add_overlay(&manager, "flaky", Phase::Validation, FlakyOverlay::new(1)).await;

        let pipeline = Pipeline::new(config, manager);
        let execution = pipeline.run(Value::Null, None).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let result = &execution.per_phase_results[0];
        assert!(result.success);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_phase_deadline_is_hard() {
        let config = PipelineConfig {
            phases: vec![PhaseConfig::new(Phase::Execution)
                .required()
                .with_timeout(Duration::from_millis(25))],
            history_capacity: 10,
        };
        let manager = make_manager();
        add_overlay(
            &manager,
            "slow",
            Phase::Execution,
            Arc::new(SlowOverlay(Duration::from_millis(500))),
        )
        .await;

        let pipeline = Pipeline::new(config, manager);
        let started = Instant::now();
        let execution = pipeline.run(Value::Null, None).await;
        assert_eq!(execution.status, ExecutionStatus::Failed(Phase::Execution));
        assert!(started.elapsed() < Duration::from_millis(400));
        let error = execution.per_phase_results[0].error.as_deref().unwrap();
        assert!(error.contains("deadline"));
    }

    #[tokio::test]
    async fn test_custom_handler_overrides_fan_out() {
        struct ConsensusHandler;

        #[async_trait]
        impl PhaseHandler for ConsensusHandler {
            async fn run_phase(
                &self,
                _phase: Phase,
                merged: &Map<String, Value>,
                _trigger: Option<&Event>,
            ) -> KernelResult<Value> {
                let votes = merged.get("votes").and_then(Value::as_u64).unwrap_or(0);
                Ok(json!({"agreed": votes >= 2}))
            }
        }

        let config = PipelineConfig {
            phases: vec![PhaseConfig::new(Phase::Consensus).required()],
            history_capacity: 10,
        };
        let pipeline = Pipeline::new(config, make_manager());
        pipeline.set_handler(Phase::Consensus, Arc::new(ConsensusHandler));

        let execution = pipeline.run(json!({"votes": 3}), None).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.merged_data.get("agreed"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_hooks_observe_all_granularities() {
        #[derive(Default)]
        struct RecordingHook {
            before: AtomicU32,
            after: AtomicU32,
            complete: AtomicU32,
        }

        #[async_trait]
        impl PipelineHook for RecordingHook {
            async fn before_phase(&self, _execution: &PipelineExecution, _phase: Phase) {
                self.before.fetch_add(1, Ordering::SeqCst);
            }

            async fn after_phase(&self, _execution: &PipelineExecution, _result: &PhaseResult) {
                self.after.fetch_add(1, Ordering::SeqCst);
            }

            async fn on_complete(&self, _execution: &PipelineExecution) {
                self.complete.fetch_add(1, Ordering::SeqCst);
            }
        }

        let config = PipelineConfig {
            phases: vec![
                PhaseConfig::new(Phase::Ingestion),
                PhaseConfig::new(Phase::Analysis),
                PhaseConfig::new(Phase::Settlement),
            ],
            history_capacity: 10,
        };
        let pipeline = Pipeline::new(config, make_manager());
        let hook = Arc::new(RecordingHook::default());
        pipeline.add_hook(hook.clone());

        pipeline.run(Value::Null, None).await;
        assert_eq!(hook.before.load(Ordering::SeqCst), 3);
        assert_eq!(hook.after.load(Ordering::SeqCst), 3);
        assert_eq!(hook.complete.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let config = PipelineConfig {
            phases: vec![PhaseConfig::new(Phase::Ingestion)],
            history_capacity: 2,
        };
        let pipeline = Pipeline::new(config, make_manager());

        for _ in 0..5 {
            pipeline.run(Value::Null, None).await;
        }
        assert_eq!(pipeline.history().len(), 2);
    }
}
