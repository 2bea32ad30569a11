//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem. The library itself only
//! emits `tracing` events; hosts and tests call [`init_structured_logging`] once to install
//! a subscriber.
//!
//! - Log level from `RUST_LOG`, otherwise derived from the environment
//!   (`PACKLINE_ENV`, then `APP_ENV`, default `development`)
//! - `PACKLINE_LOG_FORMAT=json` switches the console layer to JSON records
//! - TTY-aware ANSI colors

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::system;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging with environment-specific configuration
///
/// Safe to call repeatedly and from several threads; only the first call does anything,
/// and an already installed global subscriber is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();
        let use_ansi = !json && std::io::stdout().is_terminal();

        let console_layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .json()
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json,
                "Structured logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    system::ENVIRONMENT_VARIABLES
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .unwrap_or_else(|| system::DEFAULT_ENVIRONMENT.to_string())
        .to_lowercase()
}

/// Get log level from `RUST_LOG`, falling back to environment defaults
fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }
    default_log_level(environment).to_string()
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var(system::LOG_FORMAT_VARIABLE)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a batch lifecycle step
pub fn log_batch_operation(operation: &str, batch_id: u64, item_count: usize, status: &str) {
    tracing::debug!(
        operation = %operation,
        batch_id,
        item_count,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
