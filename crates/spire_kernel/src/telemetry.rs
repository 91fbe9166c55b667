//! Tracing initialization.
//!
//! One shared setup path for embedders and tests. The kernel emits
//! structured records at every state transition; where they go is the
//! embedder's choice via the standard `RUST_LOG` filter.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// Respects `RUST_LOG`; defaults to `info`. Calling more than once is
/// harmless - later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
