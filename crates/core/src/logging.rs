//! Structured logging setup for fleet ledger hosts.
//!
//! Log level comes from the `RUST_LOG` environment variable when set,
//! otherwise from the configured default.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize human-readable logging at `info` unless `RUST_LOG` says otherwise.
///
/// # Example
/// ```no_run
/// use fleetledger_core::logging;
///
/// logging::init();
/// tracing::info!("Ledger host started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize JSON logging for log aggregation.
///
/// # Example
/// ```no_run
/// use fleetledger_core::logging;
///
/// logging::init_json();
/// tracing::info!(backend = "sqlite", "Ledger host started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize logging from the `[logging]` section.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_from_config(config: &LoggingConfig) -> bool {
    let filter = env_filter(&config.level);
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .is_ok()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init().is_ok()
    }
}
