//! SPIRE Kernel
//!
//! Composition root for the processing kernel: constructs the event
//! bus, sandbox runtime, overlay manager, and phase pipeline once at
//! startup and hands them out through an explicit [`KernelContext`] -
//! no global mutable singletons anywhere. Also hosts the persistence
//! collaborator contract and the administrative control surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod context;
pub mod store;
pub mod telemetry;

pub use admin::AdminSurface;
pub use context::{KernelBuilder, KernelConfig, KernelContext};
pub use store::{GraphStore, MemoryStore};
