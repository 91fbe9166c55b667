//! The event bus.
//!
//! Publishing enqueues onto a bounded queue; a single background worker
//! dequeues (bounded poll wait) and delivers to all matching
//! subscriptions concurrently. Handler failures retry with linear
//! backoff (`base_delay * attempt`) up to a fixed attempt cap; exhausted
//! events move to the bounded dead-letter queue.

use crate::cascade::CascadeChain;
use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::event::{Event, EventRecord, EventType};
use crate::stats::{DeliveryStats, DeliveryStatsSnapshot};
use crate::subscription::{EventHandler, Subscription};
use async_trait::async_trait;
use spire_core::{ChainId, EventPriority, KernelError, KernelResult, OverlayId, SubscriptionId, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bus configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bounded publish queue capacity
    pub queue_capacity: usize,
    /// Maximum wait when polling the queue
    pub poll_interval: Duration,
    /// Delivery attempts per handler before dead-lettering
    pub max_delivery_attempts: u32,
    /// Base delay for the linear retry backoff
    pub retry_base_delay: Duration,
    /// Dead-letter queue capacity
    pub dead_letter_capacity: usize,
    /// Delivery stats sample window
    pub stats_window: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_024,
            poll_interval: Duration::from_secs(1),
            max_delivery_attempts: 3,
            retry_base_delay: Duration::from_millis(25),
            dead_letter_capacity: DeadLetterQueue::DEFAULT_CAPACITY,
            stats_window: DeliveryStats::DEFAULT_WINDOW,
        }
    }
}

/// Persistence collaborator for cascade durability
///
/// Chains and their events are recorded so cascades survive a restart.
/// The bus never assumes a particular store technology.
#[async_trait]
pub trait CascadeStore: Send + Sync {
    /// Durably record a new cascade chain
    async fn record_chain(&self, chain: &CascadeChain) -> KernelResult<()>;

    /// Durably record an event belonging to a cascade
    async fn record_event(&self, record: &EventRecord) -> KernelResult<()>;
}

/// No-op store for embedders that do not persist cascades
pub struct NoopCascadeStore;

#[async_trait]
impl CascadeStore for NoopCascadeStore {
    async fn record_chain(&self, _chain: &CascadeChain) -> KernelResult<()> {
        Ok(())
    }

    async fn record_event(&self, _record: &EventRecord) -> KernelResult<()> {
        Ok(())
    }
}

/// Subscription storage, indexed by event type for O(1) candidate lookup
#[derive(Default)]
struct SubscriptionIndex {
    by_type: HashMap<EventType, Vec<SubscriptionId>>,
    subs: HashMap<SubscriptionId, Subscription>,
}

impl SubscriptionIndex {
    fn insert(&mut self, sub: Subscription) {
        self.by_type
            .entry(sub.event_type.clone())
            .or_default()
            .push(sub.id);
        self.subs.insert(sub.id, sub);
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.subs.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_type.get_mut(&sub.event_type) {
            ids.retain(|sid| *sid != id);
            if ids.is_empty() {
                self.by_type.remove(&sub.event_type);
            }
        }
        true
    }

    fn matching(&self, event: &Event) -> Vec<Subscription> {
        let Some(ids) = self.by_type.get(&event.event_type) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.subs.get(id))
            .filter(|sub| sub.matches(event))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.subs.len()
    }
}

struct BusInner {
    config: BusConfig,
    subscriptions: RwLock<SubscriptionIndex>,
    chains: Mutex<HashMap<ChainId, CascadeChain>>,
    dead_letters: Mutex<DeadLetterQueue>,
    stats: Mutex<DeliveryStats>,
    store: Arc<dyn CascadeStore>,
    pending: AtomicUsize,
    shutdown: CancellationToken,
}

/// The event bus
///
/// Must be constructed from within a tokio runtime: the background
/// delivery worker is spawned at creation.
pub struct EventBus {
    inner: Arc<BusInner>,
    tx: mpsc::Sender<Event>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus with no cascade persistence
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self::with_store(config, Arc::new(NoopCascadeStore))
    }

    /// Create a bus backed by a cascade store
    #[must_use]
    pub fn with_store(config: BusConfig, store: Arc<dyn CascadeStore>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let inner = Arc::new(BusInner {
            dead_letters: Mutex::new(DeadLetterQueue::new(config.dead_letter_capacity)),
            stats: Mutex::new(DeliveryStats::new(config.stats_window)),
            subscriptions: RwLock::new(SubscriptionIndex::default()),
            chains: Mutex::new(HashMap::new()),
            store,
            pending: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            config,
        });
        let worker = tokio::spawn(worker_loop(Arc::clone(&inner), rx));
        Self {
            inner,
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Subscribe a handler to an event type at or above a priority
    pub fn subscribe(
        &self,
        event_type: EventType,
        min_priority: EventPriority,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let sub = Subscription::new(event_type, min_priority, handler);
        let id = sub.id;
        self.inner.subscriptions.write().unwrap().insert(sub);
        tracing::debug!(subscription = %id, "subscription added");
        id
    }

    /// Remove a subscription; returns `false` if it did not exist
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.subscriptions.write().unwrap().remove(id);
        if removed {
            tracing::debug!(subscription = %id, "subscription removed");
        }
        removed
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().unwrap().len()
    }

    /// Publish an event
    ///
    /// Returns the number of subscriptions matching at enqueue time.
    /// Delivery itself is asynchronous; outcomes are visible through
    /// [`EventBus::stats`] and the dead-letter queue.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the bounded queue is full.
    pub fn publish(&self, event: Event) -> KernelResult<usize> {
        let matched = self
            .inner
            .subscriptions
            .read()
            .unwrap()
            .matching(&event)
            .len();
        self.enqueue(event)?;
        Ok(matched)
    }

    /// Start a cascade: create a chain, record it durably, publish the
    /// root event tagged with the chain id.
    ///
    /// # Errors
    ///
    /// Returns store errors and queue-capacity errors.
    pub async fn publish_cascade(&self, event: Event, max_hops: u32) -> KernelResult<ChainId> {
        let chain = CascadeChain::new(event.id, max_hops);
        let chain_id = chain.chain_id;
        let event = event.with_chain(chain_id);

        self.inner.store.record_chain(&chain).await?;
        self.inner
            .store
            .record_event(&EventRecord::from_event(&event))
            .await?;
        self.inner.chains.lock().unwrap().insert(chain_id, chain);

        self.enqueue(event)?;
        tracing::debug!(chain = %chain_id, max_hops, "cascade started");
        Ok(chain_id)
    }

    /// Extend a cascade by one hop
    ///
    /// Returns `Ok(false)` as a silent stop when the hop budget is
    /// exhausted; cascades are best-effort propagation, not guaranteed
    /// delivery.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown chain, plus store and
    /// queue-capacity errors.
    pub async fn propagate_cascade(&self, chain_id: ChainId, event: Event) -> KernelResult<bool> {
        let admitted = {
            let mut chains = self.inner.chains.lock().unwrap();
            let chain = chains.get_mut(&chain_id).ok_or_else(|| KernelError::NotFound {
                kind: "CascadeChain".to_string(),
                id: chain_id.to_string(),
            })?;
            chain.record_hop()
        };
        if !admitted {
            tracing::debug!(chain = %chain_id, "cascade hop budget exhausted");
            return Ok(false);
        }

        let event = event.with_chain(chain_id);
        self.inner
            .store
            .record_event(&EventRecord::from_event(&event))
            .await?;
        self.enqueue(event)?;
        Ok(true)
    }

    /// Cycle gate: admit an overlay into a chain
    ///
    /// Returns `false` (do not invoke) when the overlay was already
    /// visited or the chain is unknown. Never touches the hop count.
    pub fn mark_visited(&self, chain_id: ChainId, overlay_id: OverlayId) -> bool {
        self.inner
            .chains
            .lock()
            .unwrap()
            .get_mut(&chain_id)
            .map(|chain| chain.mark_visited(overlay_id))
            .unwrap_or(false)
    }

    /// Look up a chain snapshot
    #[must_use]
    pub fn chain(&self, chain_id: ChainId) -> Option<CascadeChain> {
        self.inner.chains.lock().unwrap().get(&chain_id).cloned()
    }

    /// Current dead letters, oldest first
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .dead_letters
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    /// Delivery statistics snapshot
    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.inner.stats.lock().unwrap().snapshot()
    }

    /// Wait until every enqueued event has been delivered (or
    /// dead-lettered)
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the queue does not drain in time.
    pub async fn flush(&self, timeout: Duration) -> KernelResult<()> {
        let deadline = Instant::now() + timeout;
        while self.inner.pending.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                return Err(KernelError::Timeout {
                    operation: "bus flush".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    /// Graceful shutdown: stop accepting work, drain what is queued,
    /// stop the worker. The wait is bounded by `drain_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the drain did not finish; the worker is
    /// aborted in that case.
    pub async fn shutdown(&self, drain_timeout: Duration) -> KernelResult<()> {
        self.inner.shutdown.cancel();
        let Some(mut handle) = self.worker.lock().unwrap().take() else {
            return Ok(());
        };
        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(_) => {
                tracing::info!("event bus drained and stopped");
                Ok(())
            }
            Err(_) => {
                handle.abort();
                tracing::warn!("event bus shutdown timed out; worker aborted");
                Err(KernelError::Timeout {
                    operation: "bus shutdown".to_string(),
                })
            }
        }
    }

    fn enqueue(&self, event: Event) -> KernelResult<()> {
        use tokio::sync::mpsc::error::TrySendError;
        if self.inner.shutdown.is_cancelled() {
            return Err(KernelError::Cancelled);
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                self.inner.pending.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(KernelError::CapacityExceeded {
                resource: "event queue".to_string(),
                limit: self.inner.config.queue_capacity as u64,
            }),
            Err(TrySendError::Closed(_)) => Err(KernelError::Cancelled),
        }
    }
}

async fn worker_loop(inner: Arc<BusInner>, mut rx: mpsc::Receiver<Event>) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                // Drain without waiting for more producers
                while let Ok(event) = rx.try_recv() {
                    deliver(&inner, event).await;
                    inner.pending.fetch_sub(1, Ordering::SeqCst);
                }
                break;
            }
            recv = tokio::time::timeout(inner.config.poll_interval, rx.recv()) => {
                match recv {
                    Ok(Some(event)) => {
                        deliver(&inner, event).await;
                        inner.pending.fetch_sub(1, Ordering::SeqCst);
                    }
                    Ok(None) => break,
                    Err(_) => {} // idle poll tick
                }
            }
        }
    }
}

/// Fan out one event to all matching subscriptions concurrently
async fn deliver(inner: &BusInner, event: Event) {
    let subs = inner.subscriptions.read().unwrap().matching(&event);
    if subs.is_empty() {
        tracing::trace!(event = %event.id, event_type = %event.event_type, "no subscribers");
        return;
    }
    let deliveries = subs
        .into_iter()
        .map(|sub| deliver_to(inner, &event, sub));
    futures::future::join_all(deliveries).await;
}

async fn deliver_to(inner: &BusInner, event: &Event, sub: Subscription) {
    let started = Instant::now();
    let mut attempt: u32 = 1;
    loop {
        match sub.handler.handle(event).await {
            Ok(()) => {
                inner.stats.lock().unwrap().record_delivery(started.elapsed());
                return;
            }
            Err(err) => {
                inner.stats.lock().unwrap().record_failure();
                if attempt >= inner.config.max_delivery_attempts {
                    tracing::warn!(
                        event = %event.id,
                        subscription = %sub.id,
                        attempts = attempt,
                        error = %err,
                        "delivery exhausted; dead-lettering"
                    );
                    let mut dead_letters = inner.dead_letters.lock().unwrap();
                    dead_letters.push(DeadLetter {
                        event: event.clone(),
                        reason: err.to_string(),
                        attempts: attempt,
                        dead_lettered_at: Timestamp::now(),
                    });
                    drop(dead_letters);
                    inner.stats.lock().unwrap().record_dead_letter();
                    return;
                }
                inner.stats.lock().unwrap().record_retry();
                tokio::time::sleep(inner.config.retry_base_delay * attempt).await;
                attempt += 1;
            }
        }
    }
}
