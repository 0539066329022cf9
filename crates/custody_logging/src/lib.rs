//! Shared logging setup for Custody binaries.
//!
//! Every process writes to two sinks: a daily-rolling file under
//! `$CUSTODY_HOME/logs` and the operator console on stderr.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "custody=info,custody_db=info";
const VERBOSE_LOG_FILTER: &str = "custody=debug,custody_db=debug";

/// Logging configuration shared by Custody binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Keeps the non-blocking file writer alive. Drop it only at exit so that
/// buffered lines are flushed.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// A missing or unwritable log directory degrades to console-only logging
/// with a warning rather than failing startup.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let file_filter = env_filter_or(DEFAULT_LOG_FILTER);
    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        env_filter_or(DEFAULT_LOG_FILTER)
    };

    let (file_layer, guard, dir_error) = match ensure_logs_dir() {
        Ok(log_dir) => {
            let file_name = format!("{}.log", sanitize_name(config.app_name));
            let appender = tracing_appender::rolling::daily(log_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(err) = dir_error {
        tracing::warn!(error = %err, "File logging disabled");
    }

    Ok(LogGuard { _file: guard })
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Get the Custody home directory: `$CUSTODY_HOME`, else `~/.custody`
pub fn custody_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("CUSTODY_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".custody")
}

/// Get the logs directory: ~/.custody/logs
pub fn logs_dir() -> PathBuf {
    custody_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("custody"), "custody");
        assert_eq!(sanitize_name("custody sync/1"), "custody_sync_1");
    }
}
