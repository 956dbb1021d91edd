//! Configuration inputs for the allowed-roots resolver.
//!
//! Two optional sources extend the built-in roots:
//!
//! 1. A TOML file named `toolgate.toml` in the install root (the directory
//!    of the running executable).
//! 2. The `TOOLGATE_ALLOWED_ROOTS` environment variable.
//!
//! # Example Configuration
//!
//! ```toml
//! [[roots]]
//! path = "~/projects"
//! mode = "read-write"
//!
//! [[roots]]
//! path = "/srv/reference"
//! mode = "read-only"
//! ```
//!
//! The equivalent environment variable:
//!
//! ```text
//! TOOLGATE_ALLOWED_ROOTS="rw:~/projects,ro:/srv/reference"
//! ```
//!
//! Both sources are re-read on every validation, so edits take effect
//! without restarting. Malformed entries are skipped with a warning.

mod file;
mod types;

pub use file::{config_path, from_path, from_str, install_dir, CONFIG_FILE_NAME, ROOTS_ENV_VAR};
pub use types::{AccessMode, RootEntry, RootsFile};
