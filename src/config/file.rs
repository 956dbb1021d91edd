//! Allowed-roots configuration file loading.
//!
//! The file lives at a fixed name in the install root. A missing file is not
//! an error for the resolver; callers that need to report problems use
//! [`from_path`] directly.

use crate::config::types::{RootEntry, RootsFile};
use crate::error::SandboxError;
use std::path::{Path, PathBuf};

/// Fixed file name of the allowed-roots config inside the install root.
pub const CONFIG_FILE_NAME: &str = "toolgate.toml";

/// Environment variable holding comma-separated `[mode:]path` entries.
pub const ROOTS_ENV_VAR: &str = "TOOLGATE_ALLOWED_ROOTS";

/// Returns the config file location for an install directory.
#[must_use]
pub fn config_path(install_dir: &Path) -> PathBuf {
    install_dir.join(CONFIG_FILE_NAME)
}

/// Returns the directory containing the running executable.
///
/// This is the install root the config file is looked up in.
#[must_use]
pub fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Loads the allowed-roots file from a specific path.
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or is not
/// valid TOML. Individual malformed entries are skipped, not reported.
pub fn from_path(path: &Path) -> Result<RootsFile, SandboxError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SandboxError::configuration(
            "config_file",
            format!("failed to read '{}': {}", path.display(), e),
        )
    })?;

    from_str(&contents).map_err(|e| {
        SandboxError::configuration(
            "config_file",
            format!("failed to parse '{}': {}", path.display(), e),
        )
    })
}

/// Parses the allowed-roots file from a TOML string.
///
/// The document is first read as an untyped table; each element of the
/// `roots` array is then validated on its own so one bad entry does not
/// discard the rest.
///
/// # Errors
///
/// Returns a configuration error if the TOML itself is invalid.
pub fn from_str(toml_str: &str) -> Result<RootsFile, SandboxError> {
    let table: toml::Table = toml::from_str(toml_str)
        .map_err(|e| SandboxError::configuration("config", format!("invalid TOML: {e}")))?;

    let mut file = RootsFile::new();
    let Some(roots) = table.get("roots") else {
        return Ok(file);
    };

    let Some(items) = roots.as_array() else {
        tracing::warn!("'roots' is not an array; ignoring it");
        file.skipped += 1;
        return Ok(file);
    };

    for (index, item) in items.iter().enumerate() {
        match RootEntry::from_value(item.clone()) {
            Ok(entry) => file.roots.push(entry),
            Err(reason) => {
                tracing::warn!(index, reason = %reason, "Skipping malformed root entry");
                file.skipped += 1;
            }
        }
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessMode;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn from_str_parses_roots() {
        let toml = r#"
[[roots]]
path = "~/projects"
mode = "read-write"

[[roots]]
path = "/srv/reference"
mode = "read-only"
        "#;

        let file = from_str(toml).unwrap();

        assert_eq!(file.roots.len(), 2);
        assert_eq!(file.roots[0].path, "~/projects");
        assert_eq!(file.roots[1].mode, AccessMode::ReadOnly);
        assert_eq!(file.skipped, 0);
    }

    #[test]
    fn from_str_skips_malformed_entries() {
        let toml = r#"
[[roots]]
path = "/ok"
mode = "ro"

[[roots]]
mode = "read-write"

[[roots]]
path = "/bad-mode"
mode = "sudo"
        "#;

        let file = from_str(toml).unwrap();

        assert_eq!(file.roots, vec![RootEntry::new("/ok", AccessMode::ReadOnly)]);
        assert_eq!(file.skipped, 2);
    }

    #[test]
    fn from_str_without_roots_is_empty() {
        let file = from_str("title = \"nothing here\"").unwrap();
        assert!(file.is_empty());
    }

    #[test]
    fn from_str_roots_not_array_is_skipped() {
        let file = from_str("roots = \"/tmp\"").unwrap();
        assert!(file.is_empty());
        assert_eq!(file.skipped, 1);
    }

    #[test]
    fn from_str_error_on_invalid_toml() {
        let result = from_str("this is not valid toml [[[");

        assert!(result.is_err());
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn from_path_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = config_path(temp_dir.path());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            [[roots]]
            path = "/data"
        "#
        )
        .unwrap();

        let roots = from_path(&path).unwrap();
        assert_eq!(roots.roots, vec![RootEntry::new("/data", AccessMode::ReadWrite)]);
    }

    #[test]
    fn from_path_error_on_missing_file() {
        let result = from_path(Path::new("/nonexistent/path/toolgate.toml"));

        assert!(result.is_err());
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn config_path_uses_fixed_name() {
        let path = config_path(Path::new("/opt/toolgate"));
        assert!(path.ends_with(CONFIG_FILE_NAME));
    }
}
