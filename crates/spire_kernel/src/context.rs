//! The kernel composition root.
//!
//! `KernelBuilder` constructs every component once at startup and wires
//! them together; the resulting `KernelContext` is passed by reference
//! to anything that needs kernel access. This replaces module-level
//! singletons and the thread-safety ambiguity they carry.

use crate::store::{GraphStore, MemoryStore};
use async_trait::async_trait;
use spire_bus::{BusConfig, CascadeStore, Event, EventBus, EventType};
use spire_core::{EventPriority, KernelResult};
use spire_overlay::{ManagerConfig, OverlayManager};
use spire_pipeline::{Pipeline, PipelineConfig};
use spire_sandbox::{RuntimeConfig, SandboxRuntime, StoreAccess};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for every kernel component
#[derive(Debug, Clone, Default)]
pub struct KernelConfig {
    /// Event bus configuration
    pub bus: BusConfig,
    /// Overlay manager configuration
    pub manager: ManagerConfig,
    /// Pipeline configuration
    pub pipeline: PipelineConfig,
    /// Sandbox runtime configuration
    pub runtime: RuntimeConfig,
}

/// Builds a [`KernelContext`]
#[derive(Default)]
pub struct KernelBuilder {
    config: KernelConfig,
}

impl KernelBuilder {
    /// Start from default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Build over the in-memory store
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn build(self) -> Arc<KernelContext> {
        self.build_with_store(Arc::new(MemoryStore::new()))
    }

    /// Build over a persistence collaborator
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn build_with_store<S>(self, store: Arc<S>) -> Arc<KernelContext>
    where
        S: GraphStore + Send + Sync + 'static,
    {
        let bus = Arc::new(EventBus::with_store(
            self.config.bus,
            Arc::clone(&store) as Arc<dyn CascadeStore>,
        ));
        let runtime = Arc::new(SandboxRuntime::new(
            self.config.runtime,
            Arc::clone(&store) as Arc<dyn StoreAccess>,
        ));
        let manager = Arc::new(OverlayManager::new(
            self.config.manager,
            Arc::clone(&runtime),
            Arc::clone(&bus),
        ));
        let pipeline = Arc::new(Pipeline::new(self.config.pipeline, Arc::clone(&manager)));

        tracing::info!("kernel context constructed");
        Arc::new(KernelContext {
            bus,
            runtime,
            manager,
            pipeline,
            store,
        })
    }
}

/// The kernel's shared context
///
/// Owns the four components; everything else borrows them from here.
pub struct KernelContext {
    bus: Arc<EventBus>,
    runtime: Arc<SandboxRuntime>,
    manager: Arc<OverlayManager>,
    pipeline: Arc<Pipeline>,
    store: Arc<dyn GraphStore>,
}

impl KernelContext {
    /// The event bus
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The sandbox runtime
    #[must_use]
    pub fn runtime(&self) -> &Arc<SandboxRuntime> {
        &self.runtime
    }

    /// The overlay manager
    #[must_use]
    pub fn manager(&self) -> &Arc<OverlayManager> {
        &self.manager
    }

    /// The phase pipeline
    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// The persistence collaborator
    #[must_use]
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Bridge a bus event type into overlay routing
    ///
    /// Published events of this type are handed to the overlay manager,
    /// which invokes every matching ACTIVE overlay. This is how a
    /// cascade revisits the manager outside of any pipeline run.
    pub fn bridge(&self, event_type: impl Into<EventType>) {
        let handler = Arc::new(RouterHandler {
            manager: Arc::clone(&self.manager),
        });
        self.bus
            .subscribe(event_type.into(), EventPriority::Low, handler);
    }

    /// Graceful shutdown: drain the bus within a bounded timeout
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the drain did not finish in time.
    pub async fn shutdown(&self, timeout: Duration) -> KernelResult<()> {
        tracing::info!("kernel shutting down");
        self.bus.shutdown(timeout).await
    }
}

/// Routes bus deliveries into the overlay manager
struct RouterHandler {
    manager: Arc<OverlayManager>,
}

#[async_trait]
impl spire_bus::EventHandler for RouterHandler {
    async fn handle(&self, event: &Event) -> KernelResult<()> {
        // Per-overlay failures are contained by breakers and the
        // sandbox; routing itself always succeeds
        let outcomes = self.manager.route_event(event).await;
        tracing::trace!(
            event = %event.id,
            overlays = outcomes.len(),
            "event routed to overlays"
        );
        Ok(())
    }
}
