//! Tracing subscriber setup

use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` takes precedence over the configured level
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_filter())
            .with_context(|| format!("Invalid log filter '{}'", config.log_filter()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    let installed = match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
