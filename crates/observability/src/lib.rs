//! Tracing/logging setup shared by binaries, tests and benches.

pub mod config;
pub mod tracing;

pub use config::{LOG_FORMAT_ENV, LogFormat, ObservabilityConfig};
pub use tracing::init_with;

/// Initialize process-wide tracing from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let config = ObservabilityConfig::from_env();
    if let Err(error) = tracing::init_with(&config) {
        eprintln!("tracing setup failed: {error:#}");
    }
}
