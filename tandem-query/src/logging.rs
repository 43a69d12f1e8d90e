//! Logging bootstrap driven by environment variables.
//!
//! # Environment Variables
//!
//! - `TANDEM_DEBUG=true` (or `1`, `yes`) - Enable debug logging
//! - `TANDEM_LOG_LEVEL=debug|info|warn|error|trace` - Set a specific log level
//! - `TANDEM_LOG_FORMAT=json|pretty|compact` - Set the output format (default: json)
//!
//! ```rust,no_run
//! use tandem_query::logging;
//!
//! // Call once at startup; later calls are no-ops.
//! logging::init();
//! ```
//!
//! Inside the workspace every statement is logged at debug level with its SQL text,
//! connection checkouts at trace level, and discarded connections at warn level.
//! Applications that install their own `tracing` subscriber can skip [`init`] entirely.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Crates whose events the bootstrap subscriber lets through.
const TARGETS: &[&str] = &[
    "tandem",
    "tandem_query",
    "tandem_postgres",
    "tandem_sqlx",
    "tandem_mysql",
];

/// Check if debug logging is enabled via `TANDEM_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("TANDEM_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `TANDEM_LOG_LEVEL`.
///
/// Defaults to "debug" if `TANDEM_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("TANDEM_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `TANDEM_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("TANDEM_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Filter directive enabling `level` for every workspace crate.
pub fn filter_directive(level: &str) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the logging system.
///
/// Does nothing unless `TANDEM_DEBUG` or `TANDEM_LOG_LEVEL` is set, or when built without
/// the `tracing-subscriber` feature.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("TANDEM_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(filter_directive(level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "Tandem logging initialized"
                );
            }
        }
    });
}
