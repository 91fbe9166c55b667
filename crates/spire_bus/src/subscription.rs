//! Subscriptions and the event handler contract.

use crate::event::{Event, EventType};
use async_trait::async_trait;
use spire_core::{EventPriority, KernelResult, SubscriptionId};
use std::sync::Arc;

/// Handler invoked for each delivered event
///
/// A handler failure is retried with backoff by the bus worker; after the
/// attempt cap the event moves to the dead-letter queue.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivered event
    ///
    /// # Errors
    ///
    /// Returns an error when delivery should be retried.
    async fn handle(&self, event: &Event) -> KernelResult<()>;
}

/// A registered subscription
#[derive(Clone)]
pub struct Subscription {
    /// Subscription identifier
    pub id: SubscriptionId,
    /// Event type this subscription matches
    pub event_type: EventType,
    /// Minimum priority accepted
    pub min_priority: EventPriority,
    /// The handler to deliver to
    pub handler: Arc<dyn EventHandler>,
}

impl Subscription {
    /// Create a new subscription with a fresh id
    #[must_use]
    pub fn new(
        event_type: EventType,
        min_priority: EventPriority,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            event_type,
            min_priority,
            handler,
        }
    }

    /// Check whether an event matches this subscription
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type == event.event_type && event.priority >= self.min_priority
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("min_priority", &self.min_priority)
            .finish_non_exhaustive()
    }
}
