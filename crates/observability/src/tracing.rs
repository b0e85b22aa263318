//! Tracing subscriber installation.
//!
//! JSON logs with timestamps by default; plain text on request. Filtering
//! follows `RUST_LOG` unless the config carries its own directives.

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

use crate::config::{LogFormat, ObservabilityConfig};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber described by `config`.
///
/// Fails only on invalid filter directives. If a subscriber is already
/// installed it is kept and this call is a no-op.
pub fn init_with(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = match &config.filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter `{directives}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(SystemTime)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if installed.is_ok() {
        ::tracing::debug!(format = ?config.format, "tracing initialized");
    }
    Ok(())
}
