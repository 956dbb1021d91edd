//! Security checks that run before any disk I/O or process spawn.
//!
//! - **Allowed roots**: merged from defaults, the config file and the
//!   environment, with read-write winning any disagreement
//! - **Path validation**: forbidden paths and directories, then containment
//! - **Command validation**: dangerous patterns, then a base-command allowlist
//! - **Environment filtering**: drops variables that look like secrets
//!
//! ## Path Validation
//!
//! ```rust,ignore
//! use toolgate::tools::security::{PathOperation, PathValidator, RootSources};
//!
//! let validator = PathValidator::new(RootSources::from_process());
//!
//! let result = validator.validate("~/notes.txt", PathOperation::Write);
//! if !result.valid {
//!     for reason in &result.reasons {
//!         eprintln!("rejected: {reason}");
//!     }
//! }
//! ```
//!
//! Validators return tagged results and never fail; callers decide how to
//! surface a rejection.

mod command;
mod environment;
mod normalize;
mod path;
mod roots;

pub use command::{validate_command, CommandValidationResult, CommandValidator, ALLOWED_COMMANDS};
pub use environment::{
    filter_process_environment, filter_sensitive_environment, is_sensitive_name, EnvSource,
    ProcessEnv, SENSITIVE_KEYWORDS,
};
pub use normalize::{expand_home, normalize_lexical, normalize_path, CASE_INSENSITIVE};
pub use path::{
    PathOperation, PathValidationResult, PathValidator, FORBIDDEN_DIRECTORIES, FORBIDDEN_PATHS,
};
pub use roots::{merge_roots, parse_env_roots, resolve_allowed_roots, AllowedRoot, RootSources};
