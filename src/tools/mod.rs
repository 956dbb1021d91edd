//! Tool-facing entry points for touching the filesystem or spawning processes.
//!
//! ```text
//! +------------------------------------------------------------+
//! |                  Tool handler (caller)                     |
//! +------------------------------------------------------------+
//!        | read / write / list             | run
//!        v                                 v
//! +--------------------+         +-----------------------------+
//! |  SafeFileAccessor  |         |        CommandRunner        |
//! +--------------------+         +-----------------------------+
//!        |                           |                  |
//!        v                           v                  v
//! +--------------------+   +-----------------+  +-----------------+
//! |   PathValidator    |<--| cwd check       |  | CommandValidator|
//! +--------------------+   +-----------------+  +-----------------+
//!        |
//!        v
//! +--------------------+
//! | resolve_allowed_   |  defaults + toolgate.toml + TOOLGATE_ALLOWED_ROOTS
//! | roots (per call)   |
//! +--------------------+
//! ```
//!
//! Validators in [`security`] return tagged results and never fail. The
//! accessor and runner turn rejections into [`SandboxError`](crate::error::SandboxError)
//! values carrying every reason.

mod file_access;
mod runner;
pub mod security;

pub use file_access::{DirEntry, EntryType, SafeFileAccessor, DEFAULT_MAX_READ_BYTES};
pub use runner::{CommandOutput, CommandRequest, CommandRunner, DEFAULT_TIMEOUT, MAX_TIMEOUT};
