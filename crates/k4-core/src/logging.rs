//! Logging initialization using the `tracing` ecosystem.
//!
//! Sink writers never install a subscriber themselves; they only emit through
//! the `tracing` macros. The process entry point calls [`init_logging`] once:
//! - Console output (colored human-readable, or JSON lines)
//! - File output (daily rotation via `tracing-appender`)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use serde::Deserialize;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// The `log` block of the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Default level if `RUST_LOG` is not set.
    pub level: Option<String>,
    /// Directory for daily-rotating log files.
    pub dir: Option<String>,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

/// Initialize the global tracing subscriber.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `file_prefix`: used as the log file prefix (e.g. `"k4-runner"`)
/// - `json`: structured JSON output on every layer
pub fn init_logging(log_level: &str, log_dir: Option<&str>, file_prefix: &str, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    let file_layer = log_dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, file_prefix);
        if json {
            fmt::layer().json().with_writer(appender).with_target(true).boxed()
        } else {
            fmt::layer().with_writer(appender).with_ansi(false).with_target(true).boxed()
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
