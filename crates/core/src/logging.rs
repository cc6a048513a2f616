//! Structured logging infrastructure for FleetOps.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the logging system from the `[logging]` config section.
///
/// Log level can be overridden via the `RUST_LOG` environment variable.
/// With `json = true` every line is a JSON object, for production
/// collectors.
///
/// # Example
/// ```no_run
/// use fleetops_core::{logging, LoggingConfig};
///
/// logging::init_from_config(&LoggingConfig::default());
/// tracing::info!(service = "fleetops-node", "Service started");
/// ```
pub fn init_from_config(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(filter(&config.level));
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}
