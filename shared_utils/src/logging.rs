//! Logging Module
//!
//! Unified logging built on `tracing`:
//! - Daily-rotated log file in the system temp directory (or a chosen dir)
//! - Human-readable stderr layer
//! - Old log cleanup (keep the newest N files)
//! - Structured records for every external tool invocation
//!
//! # Examples
//!
//! ```no_run
//! use shared_utils::logging::{LogConfig, init_logging};
//! use tracing::info;
//!
//! init_logging("img_jpegli", LogConfig::default()).expect("Failed to initialize logging");
//! info!("Program started");
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log directory (system temp dir by default)
    pub log_dir: PathBuf,
    /// Number of log files kept after cleanup
    pub max_files: usize,
    /// Level for our own crates
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir(),
            max_files: 5,
            level: Level::INFO,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.log_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Directive used when `RUST_LOG` is not set.
    fn default_directive(&self, program_name: &str) -> String {
        format!(
            "{}={},shared_utils={}",
            program_name, self.level, self.level
        )
    }
}

/// Initialize the global subscriber.
///
/// Log file name: `{program_name}.log` (with a date suffix from the daily
/// rotation). `RUST_LOG` overrides the configured level.
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<()> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;

    let log_file_name = format!("{}.log", program_name);
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, &log_file_name);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive(program_name)));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Logging was already initialized")?;

    tracing::info!(
        program = program_name,
        log_dir = ?config.log_dir,
        log_file = log_file_name,
        max_files = config.max_files,
        level = ?config.level,
        "Logging system initialized"
    );

    cleanup_old_logs(&config.log_dir, program_name, config.max_files)?;

    Ok(())
}

/// Keep only the `max_files` most recently modified logs of this program.
///
/// Rotated files are named `{program}.log.YYYY-MM-DD`; anything else in the
/// directory is left alone.
fn cleanup_old_logs(log_dir: &Path, program_name: &str, max_files: usize) -> Result<()> {
    let prefix = format!("{}.log", program_name);

    let mut logs: Vec<(PathBuf, SystemTime)> = std::fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_file()
                .then(|| meta.modified().ok())
                .flatten()
                .map(|modified| (entry.path(), modified))
        })
        .collect();

    // newest first
    logs.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in logs.iter().skip(max_files) {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = ?path, "Removed old log file"),
            Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove old log file"),
        }
    }

    Ok(())
}

/// Record one external tool invocation (cjpegli, exiftool).
///
/// Success is logged at info with the output at debug; failures and
/// signal terminations are logged at warn with the captured output.
pub fn log_external_tool(
    tool_name: &str,
    args: &[String],
    output: &str,
    exit_code: Option<i32>,
    duration: Duration,
) {
    let command = format!("{} {}", tool_name, args.join(" "));

    match exit_code {
        Some(0) => {
            tracing::info!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = 0,
                "External tool completed successfully"
            );
            tracing::debug!(tool = tool_name, output = %output, "External tool output");
        }
        Some(code) => {
            tracing::warn!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = code,
                output = %output,
                "External tool failed"
            );
        }
        None => {
            tracing::warn!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                output = %output,
                "External tool terminated without exit code"
            );
        }
    }
}

/// Record the end of a named operation (a whole batch run).
pub fn log_operation_end(operation: &str, duration: Duration, success: bool) {
    if success {
        tracing::info!(
            operation = operation,
            duration_secs = duration.as_secs_f64(),
            "Operation completed successfully"
        );
    } else {
        tracing::error!(
            operation = operation,
            duration_secs = duration.as_secs_f64(),
            "Operation failed"
        );
    }
}
