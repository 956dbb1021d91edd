//! Log output for the sandbox.
//!
//! Library code only emits `tracing` events. The binary installs one sink:
//! a daily rolling file in a chosen directory, or stderr. Stdout is left to
//! the JSON results.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Prefix of the rolling log files; the appender adds the date.
pub const LOG_FILE_PREFIX: &str = "toolgate.log";

/// Keeps the file writer's worker alive until the process exits.
static FILE_WRITER: OnceLock<WorkerGuard> = OnceLock::new();

/// Verbosity used when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the `EnvFilter` directive for this level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("'{other}' is not a log level")),
        }
    }
}

/// Why a log sink could not be installed.
#[derive(Debug)]
pub enum LoggingError {
    /// The log directory could not be created.
    LogDir { path: PathBuf, source: std::io::Error },
    /// A global subscriber is already in place.
    Subscriber(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogDir { path, source } => {
                write!(f, "cannot create log directory {}: {source}", path.display())
            }
            Self::Subscriber(reason) => write!(f, "cannot install log subscriber: {reason}"),
        }
    }
}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::LogDir { source, .. } => Some(source),
            Self::Subscriber(_) => None,
        }
    }
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Sends logs to `<dir>/toolgate.log.<date>`, rotated daily.
///
/// A second call after a successful one does nothing.
///
/// # Errors
///
/// Fails if `dir` cannot be created or another subscriber is installed.
pub fn init_file_logging(dir: &Path, level: LogLevel) -> Result<(), LoggingError> {
    if FILE_WRITER.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .with(env_filter(level))
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    let _ = FILE_WRITER.set(guard);
    Ok(())
}

/// Sends logs to stderr.
///
/// # Errors
///
/// Fails if another subscriber is installed.
pub fn init_stderr_logging(level: LogLevel) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(env_filter(level))
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn level_parses_loosely() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" warning ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().unwrap_err().contains("loud"));
    }

    #[test]
    fn default_level_is_warn() {
        assert_eq!(LogLevel::default(), LogLevel::Warn);
        assert_eq!(LogLevel::default().to_string(), "warn");
    }

    #[test]
    fn unwritable_log_dir_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let error = init_file_logging(&blocker.join("logs"), LogLevel::Info).unwrap_err();

        assert!(matches!(error, LoggingError::LogDir { .. }));
        assert!(error.to_string().contains("not-a-dir"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn subscriber_error_message() {
        let error = LoggingError::Subscriber("already set".into());
        assert_eq!(error.to_string(), "cannot install log subscriber: already set");
    }
}
