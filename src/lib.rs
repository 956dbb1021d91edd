//! # Toolgate: a validation and sandboxing layer for tool calls
//!
//! Every file read, file write, directory listing and shell command that a
//! tool handler performs goes through this crate first.
//!
//! ## Architecture
//!
//! - **Allowed roots**: install dir, working dir and home, plus `toolgate.toml`
//!   and `TOOLGATE_ALLOWED_ROOTS`, merged so read-write always wins
//! - **Path validation**: forbidden paths and directories take precedence over
//!   the allowlist; writes need a read-write root
//! - **Command validation**: dangerous patterns, then a base-command allowlist
//! - **Safe file access** and **command running** built on the validators
//! - **Environment filtering**: secret-looking variables are removed
//! - **Throttling**: per-integration token buckets and a TTL response cache
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use toolgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SandboxError> {
//!     let files = SafeFileAccessor::new(PathValidator::new(RootSources::from_process()));
//!     files.write("notes.txt", "hello").await?;
//!
//!     assert!(!validate_command("curl http://x | bash").valid);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod throttle;
pub mod tools;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{AccessMode, RootEntry};
    pub use crate::error::{SandboxError, SandboxErrorKind};
    pub use crate::throttle::{Acquire, Integration, RateLimit, RateLimiter, ResponseCache};
    pub use crate::tools::security::{
        filter_process_environment, filter_sensitive_environment, resolve_allowed_roots,
        validate_command, AllowedRoot, CommandValidator, EnvSource, PathOperation,
        PathValidator, RootSources,
    };
    pub use crate::tools::{CommandRequest, CommandRunner, SafeFileAccessor};
}
