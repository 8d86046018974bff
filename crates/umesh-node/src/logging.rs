//! Tracing subscriber configuration for umesh nodes.
//!
//! Log levels follow these conventions:
//! - ERROR: Unrecoverable failures (node cannot start)
//! - WARN: Recoverable anomalies (SID space exhausted, stale reassembly, storage failures)
//! - INFO: Interface and node lifecycle (start, stop)
//! - DEBUG: Per-fragment, per-neighbor and per-update decisions
//! - TRACE: Scheduler dispatch

use tracing_subscriber::EnvFilter;

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`, which normally comes from the
/// `[logging]` section of the configuration.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber with JSON output.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
