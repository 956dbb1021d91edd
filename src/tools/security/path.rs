//! Path validation for filesystem security.
//!
//! Provides `PathValidator`, which decides whether a requested path may be
//! read, written or listed before any disk I/O happens.
//!
//! Checks run in a fixed order and the forbidden checks always win:
//!
//! 1. Expand a leading `~` and normalize the candidate exactly like the
//!    allowed roots.
//! 2. Reject if the path contains any forbidden-path entry as a substring.
//! 3. Reject if any component equals a forbidden directory name.
//!
//! Steps 2 and 3 look at both the path as spelled and the path with symlinks
//! resolved; a hit in either rejects.
//! 4. Otherwise require containment in an allowed root, and for writes a
//!    read-write root.

use crate::tools::security::normalize::{
    component_eq, expand_home, match_form, normalize_lexical, normalize_path, normalize_spelled,
};
use crate::tools::security::roots::{resolve_allowed_roots, AllowedRoot, RootSources};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Substrings that block a path wherever they appear in its normalized form.
///
/// Matching is deliberately by substring, so a sensitive file name is
/// blocked under any parent directory.
pub const FORBIDDEN_PATHS: &[&str] = &[
    // System credential stores
    "/etc/passwd",
    "/etc/shadow",
    "/etc/gshadow",
    "/etc/sudoers",
    "/etc/master.passwd",
    "windows/system32/config/sam",
    "windows/system32/config/system",
    // SSH, GPG and cloud credentials
    "/.ssh",
    "/.gnupg",
    "/.aws",
    "/.azure",
    "/.config/gcloud",
    "/.kube/config",
    "/.docker/config.json",
    "/.netrc",
    "/.git-credentials",
    "/.npmrc",
    "/.pypirc",
    // Private keys
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    ".pem",
    ".key",
    ".p12",
    ".pfx",
];

/// Directory names that block any path passing through them.
pub const FORBIDDEN_DIRECTORIES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
];

/// The kind of access being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathOperation {
    /// Read a file
    Read,
    /// Create or overwrite a file
    Write,
    /// List a directory
    List,
}

impl PathOperation {
    /// Returns the lowercase operation tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::List => "list",
        }
    }
}

impl fmt::Display for PathOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "list" => Ok(Self::List),
            other => Err(format!("unknown path operation '{other}'")),
        }
    }
}

/// Outcome of a path validation. Rejections are data, never a panic or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathValidationResult {
    /// Whether the operation is permitted
    pub valid: bool,
    /// Human-readable rejection reasons, in the order they were found
    pub reasons: Vec<String>,
    /// The normalized path, when normalization succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<PathBuf>,
}

impl PathValidationResult {
    fn accepted(resolved: PathBuf) -> Self {
        Self {
            valid: true,
            reasons: Vec::new(),
            resolved_path: Some(resolved),
        }
    }

    fn rejected(reasons: Vec<String>, resolved: Option<PathBuf>) -> Self {
        Self {
            valid: false,
            reasons,
            resolved_path: resolved,
        }
    }
}

/// Validates paths against forbidden lists and the allowed roots.
///
/// Roots are resolved from [`RootSources`] on every call, so config and
/// environment edits apply immediately. The validator holds no mutable state
/// and can be shared across concurrent tool calls.
///
/// # Example
///
/// ```rust,ignore
/// use toolgate::tools::security::{PathOperation, PathValidator, RootSources};
///
/// let validator = PathValidator::new(RootSources::from_process());
///
/// let result = validator.validate("/etc/passwd", PathOperation::Read);
/// assert!(!result.valid);
/// ```
#[derive(Debug, Clone)]
pub struct PathValidator {
    sources: RootSources,
    forbidden_paths: Vec<String>,
    forbidden_directories: Vec<String>,
}

impl PathValidator {
    /// Creates a validator with the default forbidden lists.
    #[must_use]
    pub fn new(sources: RootSources) -> Self {
        Self {
            sources,
            forbidden_paths: FORBIDDEN_PATHS.iter().map(|s| (*s).to_string()).collect(),
            forbidden_directories: FORBIDDEN_DIRECTORIES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Adds a forbidden-path substring.
    #[must_use]
    pub fn with_forbidden_path(mut self, pattern: impl Into<String>) -> Self {
        self.forbidden_paths.push(pattern.into());
        self
    }

    /// Adds a forbidden directory name.
    #[must_use]
    pub fn with_forbidden_directory(mut self, name: impl Into<String>) -> Self {
        self.forbidden_directories.push(name.into());
        self
    }

    /// Returns the resolver inputs.
    #[must_use]
    pub fn sources(&self) -> &RootSources {
        &self.sources
    }

    /// Returns the forbidden-path substrings.
    #[must_use]
    pub fn forbidden_paths(&self) -> &[String] {
        &self.forbidden_paths
    }

    /// Returns the forbidden directory names.
    #[must_use]
    pub fn forbidden_directories(&self) -> &[String] {
        &self.forbidden_directories
    }

    /// Resolves the allowed roots as they are right now.
    #[must_use]
    pub fn allowed_roots(&self) -> Vec<AllowedRoot> {
        resolve_allowed_roots(&self.sources)
    }

    /// Validates a path for an operation.
    pub fn validate(&self, path: &str, operation: PathOperation) -> PathValidationResult {
        let result = self.check(path, operation);
        if result.valid {
            tracing::debug!(path, operation = %operation, "Path accepted");
        } else {
            tracing::warn!(
                path,
                operation = %operation,
                reasons = ?result.reasons,
                "Path rejected"
            );
        }
        result
    }

    fn check(&self, path: &str, operation: PathOperation) -> PathValidationResult {
        if path.trim().is_empty() {
            return PathValidationResult::rejected(vec!["invalid path: path is empty".into()], None);
        }
        if path.contains('\0') {
            return PathValidationResult::rejected(
                vec!["invalid path: contains a NUL byte".into()],
                None,
            );
        }

        let Some(expanded) = expand_home(path, self.sources.home_dir()) else {
            return PathValidationResult::rejected(
                vec!["invalid path: '~' used with no home directory".into()],
                None,
            );
        };
        let candidate = expanded.as_path();
        let base = match (candidate.is_absolute(), self.sources.working_dir()) {
            (true, _) => Path::new("/"),
            (false, Some(dir)) => dir,
            (false, None) => {
                return PathValidationResult::rejected(
                    vec!["invalid path: relative path with no working directory".into()],
                    None,
                );
            }
        };

        let resolved = match normalize_path(candidate, base) {
            Ok(resolved) => resolved,
            Err(reason) => {
                return PathValidationResult::rejected(
                    vec![format!("invalid path: {reason}")],
                    None,
                );
            }
        };

        let spelled = normalize_spelled(candidate, base);
        let reasons = self.forbidden_reasons(&[spelled.as_path(), resolved.as_path()]);
        if !reasons.is_empty() {
            return PathValidationResult::rejected(reasons, Some(resolved));
        }

        let roots = resolve_allowed_roots(&self.sources);
        let containing: Vec<&AllowedRoot> = roots
            .iter()
            .filter(|root| is_contained(&root.root, &resolved))
            .collect();

        if containing.is_empty() {
            let listed: Vec<String> = roots
                .iter()
                .map(|r| format!("{} ({})", r.root.display(), r.mode))
                .collect();
            return PathValidationResult::rejected(
                vec![format!(
                    "outside allowed directories: '{}' is not under any of [{}]",
                    resolved.display(),
                    listed.join(", ")
                )],
                Some(resolved),
            );
        }

        if operation == PathOperation::Write
            && !containing.iter().any(|root| root.mode.allows_write())
        {
            let listed: Vec<String> = containing
                .iter()
                .map(|r| r.root.display().to_string())
                .collect();
            return PathValidationResult::rejected(
                vec![format!(
                    "read-only root: writes are not permitted under [{}]",
                    listed.join(", ")
                )],
                Some(resolved),
            );
        }

        PathValidationResult::accepted(resolved)
    }

    /// Returns the absolute, `..`-free form of a path as the caller spelled it.
    ///
    /// A leading `~` expands to the home directory and relative paths join the
    /// working directory. This is the form file and process I/O should use once
    /// [`validate`](Self::validate) has accepted the path.
    #[must_use]
    pub fn absolute_path(&self, path: &str) -> Option<PathBuf> {
        let expanded = expand_home(path, self.sources.home_dir())?;
        let base = match (expanded.is_absolute(), self.sources.working_dir()) {
            (true, _) => Path::new("/"),
            (false, Some(dir)) => dir,
            (false, None) => return None,
        };
        Some(normalize_lexical(&expanded, base))
    }

    /// Returns true if an absolute path hits a forbidden path or directory,
    /// either as spelled or after symlinks are followed.
    pub(crate) fn is_forbidden(&self, path: &Path) -> bool {
        let root = Path::new("/");
        let spelled = normalize_spelled(path, root);
        let reasons = match normalize_path(path, root) {
            Ok(resolved) => self.forbidden_reasons(&[spelled.as_path(), resolved.as_path()]),
            Err(_) => self.forbidden_reasons(&[spelled.as_path()]),
        };
        !reasons.is_empty()
    }

    fn forbidden_reasons(&self, forms: &[&Path]) -> Vec<String> {
        let mut reasons: Vec<String> = Vec::new();
        for form in forms {
            let hits = self
                .forbidden_path_reasons(form)
                .into_iter()
                .chain(self.forbidden_directory_reasons(form));
            for reason in hits {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
        reasons
    }

    fn forbidden_path_reasons(&self, resolved: &Path) -> Vec<String> {
        let haystack = match_form(resolved);
        self.forbidden_paths
            .iter()
            .filter(|pattern| haystack.contains(&match_form(Path::new(pattern.as_str()))))
            .map(|pattern| format!("forbidden path: matches '{pattern}'"))
            .collect()
    }

    fn forbidden_directory_reasons(&self, resolved: &Path) -> Vec<String> {
        let mut reasons = Vec::new();
        for component in resolved.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            if let Some(forbidden) = self
                .forbidden_directories
                .iter()
                .find(|forbidden| component_eq(&name, forbidden))
            {
                let reason = format!("forbidden directory: '{forbidden}'");
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
        reasons
    }
}

/// Returns true if `candidate` equals `root` or lies beneath it.
///
/// The relative path from root to candidate must neither climb upward nor be
/// absolute; a different drive or volume fails the prefix match outright.
fn is_contained(root: &Path, candidate: &Path) -> bool {
    match candidate.strip_prefix(root) {
        Ok(relative) => {
            !relative.is_absolute()
                && !relative
                    .components()
                    .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
        }
        Err(_) => false,
    }
}
