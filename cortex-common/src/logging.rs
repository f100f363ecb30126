//! Structured logging bootstrap, following `server/src/main.rs`'s
//! `tracing_subscriber::registry()` wiring in the teacher repo.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber. Safe to call once at process
/// start; a second call is a no-op error that we deliberately swallow so
/// tests that start multiple servers in-process don't panic.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
