//! SPIRE Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Everything here is shared by the bus, overlay, pipeline, and
//! sandbox crates; nothing here depends on the tokio runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod error;
pub mod id;
pub mod priority;
pub mod time;

// Re-exports
pub use capability::{Capability, CapabilitySet};
pub use error::{KernelError, KernelResult, ResourceFaultKind};
pub use id::{ChainId, EventId, ExecutionId, OverlayId, SubscriptionId};
pub use priority::EventPriority;
pub use time::Timestamp;
