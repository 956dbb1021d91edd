//! Configuration types for the allowed-roots file.
//!
//! The file is user-editable, so entries are parsed loosely and then
//! validated one at a time into a strict [`RootEntry`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access mode granted under an allowed root.
///
/// Ordered so that `ReadWrite > ReadOnly`; merging roots keeps the maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum AccessMode {
    /// Reads and listings only.
    #[serde(rename = "read-only", alias = "ro", alias = "readonly")]
    ReadOnly,
    /// Reads, listings and writes.
    #[default]
    #[serde(rename = "read-write", alias = "rw", alias = "readwrite")]
    ReadWrite,
}

impl AccessMode {
    /// Returns true if writes are permitted.
    #[must_use]
    pub fn allows_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Returns the canonical spelling used in config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ro" | "read-only" | "readonly" => Ok(Self::ReadOnly),
            "rw" | "read-write" | "readwrite" => Ok(Self::ReadWrite),
            other => Err(format!("unknown access mode '{other}'")),
        }
    }
}

/// A validated `{path, mode}` entry from the config file.
///
/// A missing `mode` means read-write, matching the environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootEntry {
    /// Directory path, possibly starting with `~`
    pub path: String,
    /// Access mode for the directory
    #[serde(default)]
    pub mode: AccessMode,
}

impl RootEntry {
    /// Creates a new root entry.
    #[must_use]
    pub fn new(path: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Validates a loosely-typed TOML value into an entry.
    ///
    /// Returns a description of the problem when the value is not a table
    /// with a non-empty string `path` and an optional known `mode`.
    pub fn from_value(value: toml::Value) -> Result<Self, String> {
        let entry: Self = value.try_into().map_err(|e: toml::de::Error| e.to_string())?;
        if entry.path.trim().is_empty() {
            return Err("path cannot be empty".to_string());
        }
        Ok(entry)
    }
}

/// Contents of the allowed-roots config file.
///
/// ```toml
/// [[roots]]
/// path = "~/projects"
/// mode = "read-write"
///
/// [[roots]]
/// path = "/srv/reference"
/// mode = "read-only"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootsFile {
    /// Entries that passed validation, in file order
    pub roots: Vec<RootEntry>,
    /// Number of entries that were malformed and ignored
    pub skipped: usize,
}

impl RootsFile {
    /// Creates an empty roots file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    #[must_use]
    pub fn with_root(mut self, entry: RootEntry) -> Self {
        self.roots.push(entry);
        self
    }

    /// Returns true if no valid entries were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_outranks_read_only() {
        assert!(AccessMode::ReadWrite > AccessMode::ReadOnly);
        assert_eq!(
            AccessMode::ReadOnly.max(AccessMode::ReadWrite),
            AccessMode::ReadWrite
        );
    }

    #[test]
    fn access_mode_parses_aliases() {
        assert_eq!("ro".parse::<AccessMode>(), Ok(AccessMode::ReadOnly));
        assert_eq!("Read-Only".parse::<AccessMode>(), Ok(AccessMode::ReadOnly));
        assert_eq!("RW".parse::<AccessMode>(), Ok(AccessMode::ReadWrite));
        assert!("execute".parse::<AccessMode>().is_err());
    }

    #[test]
    fn entry_from_value_defaults_mode() {
        let value: toml::Value = toml::from_str::<toml::Table>(r#"path = "/data""#)
            .unwrap()
            .into();
        let entry = RootEntry::from_value(value).unwrap();
        assert_eq!(entry, RootEntry::new("/data", AccessMode::ReadWrite));
    }

    #[test]
    fn entry_from_value_rejects_bad_shapes() {
        assert!(RootEntry::from_value(toml::Value::String("/data".into())).is_err());

        let table: toml::Table = toml::from_str(r#"path = """#).unwrap();
        assert!(RootEntry::from_value(table.into()).is_err());

        let table: toml::Table = toml::from_str(r#"path = "/x"
mode = "admin""#)
        .unwrap();
        assert!(RootEntry::from_value(table.into()).is_err());

        let table: toml::Table = toml::from_str("path = 42").unwrap();
        assert!(RootEntry::from_value(table.into()).is_err());
    }

    #[test]
    fn access_mode_display_matches_config_spelling() {
        assert_eq!(AccessMode::ReadOnly.to_string(), "read-only");
        assert_eq!(AccessMode::ReadWrite.to_string(), "read-write");
    }
}
