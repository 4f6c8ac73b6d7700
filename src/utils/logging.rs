//! # Logging
//!
//! Installs a global `tracing` subscriber from [`LoggingConfig`].
//!
//! The codec itself only emits `trace` events on the success path; dispatch
//! decisions are logged at `debug` and unknown message tags at `warn`.

use crate::config::LoggingConfig;
use crate::error::{PackStreamError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `Ok(false)`
/// when a global subscriber was already installed, so calling this twice is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str().to_lowercase()))
        .map_err(|e| PackStreamError::Config(format!("Invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(app = %config.app_name, level = %config.log_level, "logging initialized");
    }
    Ok(installed)
}
