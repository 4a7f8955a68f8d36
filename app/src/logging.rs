use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "DBCONSOLE_LOG";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open log file: {0}")]
    Appender(#[from] InitError),
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[must_use]
pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

/// Installs a daily rolling file subscriber. The terminal belongs to the UI,
/// so nothing is written to stdout. Hold the guard until exit to flush.
pub fn init_logging(dir: &Path, configured: Option<&str>) -> Result<WorkerGuard, LoggingError> {
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("dbconsole")
        .filename_suffix("log")
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let directive = filter_directive(|key| std::env::var(key).ok(), configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(LoggingError::Install)?;

    Ok(guard)
}

// DBCONSOLE_LOG > RUST_LOG > config file > default
fn filter_directive(lookup: impl Fn(&str) -> Option<String>, configured: Option<&str>) -> String {
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        .or_else(|| {
            configured
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::{filter_directive, log_dir, LOG_ENV};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn filter_priority_prefers_app_variable_then_rust_log_then_config() {
        assert_eq!(
            filter_directive(
                env(&[(LOG_ENV, "debug"), ("RUST_LOG", "warn")]),
                Some("error")
            ),
            "debug"
        );
        assert_eq!(
            filter_directive(env(&[("RUST_LOG", "warn")]), Some("error")),
            "warn"
        );
        assert_eq!(filter_directive(env(&[(LOG_ENV, "  ")]), Some("error")), "error");
        assert_eq!(filter_directive(env(&[]), None), "info");
    }

    #[test]
    fn log_files_live_under_the_config_directory() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        assert_eq!(log_dir(temp_dir.path()), temp_dir.path().join("logs"));
    }
}
