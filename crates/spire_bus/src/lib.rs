//! SPIRE Event Bus
//!
//! Typed publish/subscribe with priority filtering, cascade-chain
//! tracking, and a bounded dead-letter path for undeliverable events.
//! A single background worker drains a bounded queue and fans out each
//! event to all matching subscriptions concurrently.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod cascade;
pub mod dead_letter;
pub mod event;
pub mod stats;
pub mod subscription;

pub use bus::{BusConfig, CascadeStore, EventBus, NoopCascadeStore};
pub use cascade::{chain_depth, CascadeChain, MAX_LINEAGE_DEPTH};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use event::{Event, EventRecord, EventType, RECORD_VERSION};
pub use stats::{DeliveryStats, DeliveryStatsSnapshot};
pub use subscription::{EventHandler, Subscription};
