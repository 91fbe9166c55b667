//! Event types for the bus.
//!
//! An [`Event`] is immutable once published. The persisted form is a
//! versioned [`EventRecord`] with an explicit migration path, so replayed
//! events never get reconstructed ad hoc from untyped maps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spire_core::{ChainId, EventId, EventPriority, KernelError, KernelResult, OverlayId, Timestamp};

/// Current version of the persisted event record format
pub const RECORD_VERSION: u32 = 2;

/// Event type - a case-preserving name such as `content.created`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    /// Create a new event type
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A published event
///
/// Events are immutable once published; every mutator below is a
/// pre-publish builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: EventId,
    /// Event type, used for subscription matching
    pub event_type: EventType,
    /// Priority, used for subscription filtering
    pub priority: EventPriority,
    /// Arbitrary JSON payload
    pub payload: Value,
    /// Correlation identifier shared across related events
    pub correlation_id: Option<String>,
    /// When the event was created
    pub emitted_at: Timestamp,
    /// Overlay that emitted the event, if any
    pub source_overlay: Option<OverlayId>,
    /// Cascade chain the event belongs to, if any
    pub chain_id: Option<ChainId>,
}

impl Event {
    /// Create a new event with a fresh id
    #[must_use]
    pub fn new(event_type: impl Into<EventType>, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            priority: EventPriority::Normal,
            payload,
            correlation_id: None,
            emitted_at: Timestamp::now(),
            source_overlay: None,
            chain_id: None,
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the correlation id
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the source overlay
    #[must_use]
    pub fn with_source(mut self, overlay_id: OverlayId) -> Self {
        self.source_overlay = Some(overlay_id);
        self
    }

    /// Attach the event to a cascade chain
    #[must_use]
    pub fn with_chain(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

impl From<&str> for Event {
    fn from(event_type: &str) -> Self {
        Self::new(event_type, Value::Null)
    }
}

/// Versioned persisted form of an [`Event`]
///
/// Version 1 records predate priorities and cascade chains; migration
/// fills the missing fields explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Record format version
    pub version: u32,
    /// Event identifier
    pub id: EventId,
    /// Event type name
    pub event_type: String,
    /// Priority (absent in v1 records)
    #[serde(default)]
    pub priority: Option<EventPriority>,
    /// JSON payload
    pub payload: Value,
    /// Correlation identifier
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Emission timestamp
    pub emitted_at: Timestamp,
    /// Emitting overlay
    #[serde(default)]
    pub source_overlay: Option<OverlayId>,
    /// Cascade chain (absent in v1 records)
    #[serde(default)]
    pub chain_id: Option<ChainId>,
}

impl EventRecord {
    /// Build a current-version record from an event
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            version: RECORD_VERSION,
            id: event.id,
            event_type: event.event_type.as_str().to_string(),
            priority: Some(event.priority),
            payload: event.payload.clone(),
            correlation_id: event.correlation_id.clone(),
            emitted_at: event.emitted_at,
            source_overlay: event.source_overlay,
            chain_id: event.chain_id,
        }
    }

    /// Migrate a record of any supported version into an [`Event`]
    ///
    /// # Errors
    ///
    /// Returns an error for version 0 or versions newer than
    /// [`RECORD_VERSION`].
    pub fn migrate(self) -> KernelResult<Event> {
        match self.version {
            1 | 2 => Ok(Event {
                id: self.id,
                event_type: EventType::new(self.event_type),
                // v1 records carried no priority; replay them at the default
                priority: self.priority.unwrap_or_default(),
                payload: self.payload,
                correlation_id: self.correlation_id,
                emitted_at: self.emitted_at,
                source_overlay: self.source_overlay,
                chain_id: self.chain_id,
            }),
            version => Err(KernelError::Internal {
                message: format!("unsupported event record version {}", version),
            }),
        }
    }
}
