//! Logging setup for the job runner

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the log filter: `RUST_LOG` wins over the configured level, and an
/// unparsable level falls back to `info`
pub fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes the tracing subscriber for structured logging
///
/// # Arguments
///
/// * `log_level` - The minimum log level or a filter directive
/// * `json` - Emit one JSON object per event instead of formatted text
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = log_filter(log_level);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}
