//! # Telemetry
//!
//! Structured logging setup.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages (takes precedence)
//! - `RUST_LOG=tienda_ledger=trace` - Trace for the engines only
//! - Otherwise the configured `TIENDA_LOG` filter applies
//!
//! Repositories log each statement at `debug`, engines log committed
//! changes at `info` and best-effort failures at `warn`.

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::LedgerConfig;

/// Installs the global fmt subscriber.
///
/// Calling it twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_tracing(config: &LedgerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        debug!("Tracing subscriber already installed");
    }
}

/// Subscriber for tests: output goes through the test harness capture.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug,sqlx=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
