//! SPIRE Overlay Registry & Manager
//!
//! Tracks overlay instances, indexes them by name, event type, and
//! capability, routes incoming events to matching overlays, and wraps
//! every invocation in a per-overlay circuit breaker. Faulty or
//! malicious overlay code is contained here; it never takes the kernel
//! down.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod breaker;
pub mod contract;
pub mod descriptor;
pub mod health;
pub mod manager;
pub mod state;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use contract::{Overlay, OverlayContext, OverlayResult};
pub use descriptor::OverlayDescriptor;
pub use health::{HealthStatus, OverlayHealth};
pub use manager::{
    InvocationOutcome, InvocationRecord, ManagerConfig, OverlayInfo, OverlayManager,
    OverlayOutcome,
};
pub use state::OverlayState;
