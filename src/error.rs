//! Error types for the toolgate sandbox.
//!
//! Validators never return these: they report a tagged result instead. The
//! errors here are raised by the file accessor, the command runner, the rate
//! limiter and the config loader, and are meant to be caught at the tool-handler
//! boundary and turned into a caller-visible message.

use std::fmt;
use std::time::Duration;

/// Errors raised by sandboxed operations.
///
/// The kind is boxed to keep `Result<T, SandboxError>` small.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxError {
    kind: Box<SandboxErrorKind>,
}

/// Specific sandbox error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxErrorKind {
    /// A path or command was rejected by a validator
    SecurityValidation {
        /// The path or command that was rejected
        target: String,
        /// Ordered diagnostic reasons from the validator
        reasons: Vec<String>,
    },
    /// A read would exceed the configured size ceiling
    FileTooLarge {
        /// The file that was too large
        path: String,
        /// Actual size in bytes
        size: u64,
        /// The ceiling that was exceeded
        max_bytes: u64,
    },
    /// The requested file or directory does not exist
    NotFound {
        /// The path that was not found
        path: String,
    },
    /// The rate limit for a key is exhausted
    RateLimitExceeded {
        /// The rate-limited key
        key: String,
        /// Time until a token becomes available
        retry_after: Duration,
    },
    /// An underlying I/O operation failed
    Io {
        /// The path involved
        path: String,
        /// Description of the failure
        reason: String,
    },
    /// A command ran past its timeout
    Timeout {
        /// The command that timed out
        command: String,
        /// The timeout that was exceeded
        duration: Duration,
    },
    /// A command could not be spawned or awaited
    ExecutionFailed {
        /// Description of the failure
        reason: String,
    },
    /// Configuration could not be read or parsed
    Configuration {
        /// What was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },
}

impl SandboxError {
    /// Creates a new SandboxError with the given kind.
    #[must_use]
    pub fn new(kind: SandboxErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    /// Returns a reference to the error kind.
    #[must_use]
    pub fn kind(&self) -> &SandboxErrorKind {
        &self.kind
    }

    /// Creates a security validation error.
    #[must_use]
    pub fn security_validation(target: impl Into<String>, reasons: Vec<String>) -> Self {
        Self::new(SandboxErrorKind::SecurityValidation {
            target: target.into(),
            reasons,
        })
    }

    /// Creates a file too large error.
    #[must_use]
    pub fn file_too_large(path: impl Into<String>, size: u64, max_bytes: u64) -> Self {
        Self::new(SandboxErrorKind::FileTooLarge {
            path: path.into(),
            size,
            max_bytes,
        })
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::NotFound { path: path.into() })
    }

    /// Creates a rate limit exceeded error.
    #[must_use]
    pub fn rate_limit_exceeded(key: impl Into<String>, retry_after: Duration) -> Self {
        Self::new(SandboxErrorKind::RateLimitExceeded {
            key: key.into(),
            retry_after,
        })
    }

    /// Creates an I/O error.
    #[must_use]
    pub fn io(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Io {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// Wraps a `std::io::Error`, mapping `NotFound` to its own kind.
    #[must_use]
    pub fn from_io(path: impl Into<String>, err: &std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(path)
        } else {
            Self::io(path, err.to_string())
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(command: impl Into<String>, duration: Duration) -> Self {
        Self::new(SandboxErrorKind::Timeout {
            command: command.into(),
            duration,
        })
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::ExecutionFailed {
            reason: reason.into(),
        })
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(SandboxErrorKind::Configuration {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Returns the validator reasons if this is a security validation error.
    #[must_use]
    pub fn reasons(&self) -> Option<&[String]> {
        match self.kind.as_ref() {
            SandboxErrorKind::SecurityValidation { reasons, .. } => Some(reasons),
            _ => None,
        }
    }

    /// Returns true if a validator rejected the request.
    #[must_use]
    pub fn is_security_validation(&self) -> bool {
        matches!(*self.kind, SandboxErrorKind::SecurityValidation { .. })
    }

    /// Returns true if a read exceeded its size ceiling.
    #[must_use]
    pub fn is_file_too_large(&self) -> bool {
        matches!(*self.kind, SandboxErrorKind::FileTooLarge { .. })
    }

    /// Returns true if the target did not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(*self.kind, SandboxErrorKind::NotFound { .. })
    }

    /// Returns true if a rate limit was hit.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(*self.kind, SandboxErrorKind::RateLimitExceeded { .. })
    }

    /// Returns true if this error indicates a configuration problem.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(*self.kind, SandboxErrorKind::Configuration { .. })
    }

    /// Returns true if retrying later may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            *self.kind,
            SandboxErrorKind::RateLimitExceeded { .. } | SandboxErrorKind::Timeout { .. }
        )
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            SandboxErrorKind::SecurityValidation { target, reasons } => {
                write!(
                    f,
                    "security validation failed for '{}': {}",
                    target,
                    reasons.join("; ")
                )
            }
            SandboxErrorKind::FileTooLarge {
                path,
                size,
                max_bytes,
            } => {
                write!(
                    f,
                    "file '{}' is too large ({} bytes, limit {} bytes); read a smaller file or raise the limit",
                    path, size, max_bytes
                )
            }
            SandboxErrorKind::NotFound { path } => {
                write!(f, "'{}' not found; verify the path exists", path)
            }
            SandboxErrorKind::RateLimitExceeded { key, retry_after } => {
                write!(
                    f,
                    "rate limit exceeded for '{}'; retry after {} ms",
                    key,
                    retry_after.as_millis()
                )
            }
            SandboxErrorKind::Io { path, reason } => {
                write!(f, "I/O error on '{}': {}", path, reason)
            }
            SandboxErrorKind::Timeout { command, duration } => {
                write!(
                    f,
                    "command '{}' timed out after {:?}; consider a longer timeout",
                    command, duration
                )
            }
            SandboxErrorKind::ExecutionFailed { reason } => {
                write!(f, "command execution failed: {}", reason)
            }
            SandboxErrorKind::Configuration { field, reason } => {
                write!(f, "configuration error for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SandboxError {}
