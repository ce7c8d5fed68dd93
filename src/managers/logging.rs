//! Logging setup
//!
//! Every command except `validate` and `list` logs twice: INFO and above to
//! stderr, and the configured level to a daily file `dump-manager.log.<date>`
//! under `log_directory`. `RUST_LOG` replaces both levels when set.

use crate::config::{expand_tilde, GlobalConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Base name of the log files; the appender adds a `.YYYY-MM-DD` suffix
pub const LOG_FILE_NAME: &str = "dump-manager.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_directory: PathBuf,
    /// Level of the file output
    pub file_level: Level,
    /// Dated log files kept after pruning
    pub max_files: u32,
}

impl LoggingConfig {
    /// Take the logging settings of `[global]`.
    ///
    /// An unknown level name falls back to INFO.
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            log_directory: expand_tilde(&global.log_directory),
            file_level: Level::from_str(global.log_level.trim()).unwrap_or(Level::INFO),
            max_files: global.log_max_files,
        }
    }
}

/// Keeps the non-blocking file writer alive; dropping it flushes the file
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Install the console and file subscribers
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    fs::create_dir_all(&config.log_directory).with_context(|| {
        format!("Failed to create log directory {:?}", config.log_directory)
    })?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_directory, LOG_FILE_NAME);
    let (writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter_for(config.file_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter_for(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let removed = prune_rotated_logs(&config.log_directory, config.max_files)?;
    if removed > 0 {
        tracing::debug!("Pruned {} old log file(s)", removed);
    }

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Console-only logging for commands that only read the configuration
pub fn init_console_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(Level::INFO))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Delete all but the newest `keep` dated log files and return how many went.
///
/// Dated suffixes sort chronologically, so file names decide the age.
fn prune_rotated_logs(log_dir: &Path, keep: u32) -> Result<usize> {
    let prefix = format!("{}.", LOG_FILE_NAME);

    let mut dated: Vec<PathBuf> = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory {:?}", log_dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect();

    dated.sort_unstable_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = 0;
    for path in dated.into_iter().skip(keep as usize) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}
