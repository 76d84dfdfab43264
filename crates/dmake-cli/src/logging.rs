//! Diagnostics on stderr
//!
//! stdout carries status records and the special remote protocol, so every
//! log line goes to stderr.

use dmake_core::LogConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "DMAKE_LOG";

/// Filter from `DMAKE_LOG`, falling back to the configured level
#[must_use]
pub fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| level_filter(&config.level))
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber; later calls are ignored
pub fn init(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(filter(config));
    let installed = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(err) = installed {
        tracing::debug!(error = %err, "subscriber already installed");
    }
}
