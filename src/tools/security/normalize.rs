//! Path normalization shared by allowed roots and candidate paths.
//!
//! Both sides of every containment check go through the same function so two
//! spellings of one location compare equal.

use std::path::{Component, Path, PathBuf};

/// Whether the host filesystem is treated as case-insensitive.
pub const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

/// Expands a leading `~` to the home directory.
///
/// Returns `None` when the path needs a home directory and none is known.
#[must_use]
pub fn expand_home(raw: &str, home: Option<&Path>) -> Option<PathBuf> {
    if raw == "~" {
        return home.map(Path::to_path_buf);
    }
    if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        return home.map(|h| h.join(rest));
    }
    Some(PathBuf::from(raw))
}

/// Makes a path absolute and resolves `.` and `..` without touching the disk.
///
/// `..` never climbs above the root. Trailing separators disappear because
/// only components are kept.
#[must_use]
pub fn normalize_lexical(path: &Path, base: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut components: Vec<Component<'_>> = Vec::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            other => components.push(other),
        }
    }

    components.iter().collect()
}

/// Fully normalizes a path: lexical cleanup, symlink resolution, case folding.
///
/// Symlinks are resolved through the deepest existing ancestor so paths that
/// do not exist yet (write targets) still normalize.
///
/// # Errors
///
/// Returns a diagnostic when an existing entry cannot be resolved, such as a
/// dangling symlink or an unreadable directory.
pub fn normalize_path(path: &Path, base: &Path) -> Result<PathBuf, String> {
    let lexical = normalize_lexical(path, base);
    let resolved = resolve_symlinks(&lexical)?;
    Ok(fold_case(resolved))
}

/// Lexical cleanup and case folding, leaving symlinks as spelled.
///
/// Forbidden checks run on this form as well as the resolved one, so a
/// symlinked `.aws` or `.git` is caught by name before it is followed.
#[must_use]
pub fn normalize_spelled(path: &Path, base: &Path) -> PathBuf {
    fold_case(normalize_lexical(path, base))
}

/// Renders a normalized path for substring matching: forward slashes only.
#[must_use]
pub fn match_form(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    if CASE_INSENSITIVE {
        text.to_lowercase()
    } else {
        text
    }
}

/// Compares a path component with a name under the host's case rules.
#[must_use]
pub fn component_eq(component: &str, name: &str) -> bool {
    if CASE_INSENSITIVE {
        component.eq_ignore_ascii_case(name)
    } else {
        component == name
    }
}

fn fold_case(path: PathBuf) -> PathBuf {
    if CASE_INSENSITIVE {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path
    }
}

#[cfg(unix)]
fn resolve_symlinks(path: &Path) -> Result<PathBuf, String> {
    let mut existing = path;
    let mut remainder: Vec<&std::ffi::OsStr> = Vec::new();

    loop {
        if existing.symlink_metadata().is_ok() {
            let canonical = existing
                .canonicalize()
                .map_err(|e| format!("cannot resolve '{}': {}", existing.display(), e))?;
            let mut resolved = canonical;
            for part in remainder.iter().rev() {
                resolved.push(part);
            }
            return Ok(resolved);
        }

        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name);
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
}

// Canonical Windows paths carry a verbatim prefix that would never match
// lexically normalized roots, so only the lexical form is used there.
#[cfg(not(unix))]
fn resolve_symlinks(path: &Path) -> Result<PathBuf, String> {
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_variants() {
        let home = Path::new("/home/dev");
        assert_eq!(expand_home("~", Some(home)), Some(PathBuf::from("/home/dev")));
        assert_eq!(
            expand_home("~/notes", Some(home)),
            Some(PathBuf::from("/home/dev/notes"))
        );
        assert_eq!(expand_home("/abs", Some(home)), Some(PathBuf::from("/abs")));
        assert_eq!(expand_home("~/notes", None), None);
        // Only a leading tilde is special
        assert_eq!(
            expand_home("/a/~/b", Some(home)),
            Some(PathBuf::from("/a/~/b"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn lexical_resolves_dots_and_trailing_separators() {
        let base = Path::new("/work");
        assert_eq!(
            normalize_lexical(Path::new("/a/b/../c/./d/"), base),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(
            normalize_lexical(Path::new("src/main.rs"), base),
            PathBuf::from("/work/src/main.rs")
        );
        assert_eq!(
            normalize_lexical(Path::new("/../../etc/passwd"), base),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            normalize_lexical(Path::new("../../.."), base),
            PathBuf::from("/")
        );
    }

    #[cfg(unix)]
    #[test]
    fn normalize_keeps_missing_tail() {
        let dir = tempfile::TempDir::new().unwrap();
        let canonical_dir = dir.path().canonicalize().unwrap();
        let target = dir.path().join("new").join("deeper").join("file.txt");

        let normalized = normalize_path(&target, Path::new("/")).unwrap();

        assert_eq!(
            normalized,
            fold_case(canonical_dir.join("new").join("deeper").join("file.txt"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn normalize_follows_symlinks() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let via_link = normalize_path(&link.join("x.txt"), Path::new("/")).unwrap();
        let direct = normalize_path(&real.join("x.txt"), Path::new("/")).unwrap();

        assert_eq!(via_link, direct);
    }

    #[cfg(unix)]
    #[test]
    fn normalize_reports_dangling_symlink() {
        let dir = tempfile::TempDir::new().unwrap();
        let link = dir.path().join("dangling");
        std::os::unix::fs::symlink(dir.path().join("missing"), &link).unwrap();

        let result = normalize_path(&link, Path::new("/"));

        assert!(result.unwrap_err().contains("cannot resolve"));
    }

    #[test]
    fn match_form_uses_forward_slashes() {
        let form = match_form(Path::new("a\\b/c"));
        assert!(!form.contains('\\'));
    }
}
