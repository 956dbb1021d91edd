//! Allowed-root resolution.
//!
//! Roots come from three sources, merged by normalized path:
//!
//! 1. Built-in defaults: the install directory, the working directory and the
//!    current user's home directory, all read-write.
//! 2. The optional `toolgate.toml` config file.
//! 3. The optional `TOOLGATE_ALLOWED_ROOTS` environment variable.
//!
//! Resolution never fails. A missing or malformed source contributes nothing.

use crate::config::{self, AccessMode, ROOTS_ENV_VAR};
use crate::tools::security::environment::{EnvSource, ProcessEnv};
use crate::tools::security::normalize::{expand_home, normalize_lexical, normalize_path};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A directory inside which path operations are permitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AllowedRoot {
    /// Normalized absolute path
    pub root: PathBuf,
    /// Access mode granted under this root
    pub mode: AccessMode,
}

impl AllowedRoot {
    /// Creates a new allowed root. The path is used as given.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: AccessMode) -> Self {
        Self {
            root: root.into(),
            mode,
        }
    }
}

/// Inputs the resolver reads on every call.
///
/// [`RootSources::from_process`] captures the real process; tests build one
/// with [`RootSources::new`] and the `with_*` methods so nothing global is
/// touched.
#[derive(Clone)]
pub struct RootSources {
    env: Arc<dyn EnvSource>,
    config_file: Option<PathBuf>,
    install_dir: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
}

impl fmt::Debug for RootSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootSources")
            .field("config_file", &self.config_file)
            .field("install_dir", &self.install_dir)
            .field("working_dir", &self.working_dir)
            .field("home_dir", &self.home_dir)
            .finish_non_exhaustive()
    }
}

impl RootSources {
    /// Creates sources with an empty environment, no config file and no
    /// default roots other than the given working directory.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            env: Arc::new(HashMap::<String, String>::new()),
            config_file: None,
            install_dir: None,
            working_dir: Some(working_dir.into()),
            home_dir: None,
        }
    }

    /// Captures the real process: environment, executable directory, config
    /// file next to the executable, current directory and home directory.
    #[must_use]
    pub fn from_process() -> Self {
        let install_dir = config::install_dir();
        Self {
            env: Arc::new(ProcessEnv),
            config_file: install_dir.as_deref().map(config::config_path),
            install_dir,
            working_dir: std::env::current_dir().ok(),
            home_dir: dirs::home_dir(),
        }
    }

    /// Replaces the environment source.
    #[must_use]
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Sets the config file path.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the install directory.
    #[must_use]
    pub fn with_install_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(path.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Sets the home directory.
    #[must_use]
    pub fn with_home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(path.into());
        self
    }

    /// Returns the environment source.
    #[must_use]
    pub fn env(&self) -> &dyn EnvSource {
        self.env.as_ref()
    }

    /// Returns the working directory relative paths resolve against.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Returns the home directory.
    #[must_use]
    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    /// Returns the config file path.
    #[must_use]
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}

/// Normalizes a root path, falling back to the lexical form.
///
/// Returns `None` for relative paths when there is no working directory.
fn normalize_root(path: &Path, sources: &RootSources) -> Option<PathBuf> {
    let base = match (path.is_absolute(), sources.working_dir()) {
        (true, _) => Path::new("/"),
        (false, Some(dir)) => dir,
        (false, None) => return None,
    };
    Some(normalize_path(path, base).unwrap_or_else(|_| normalize_lexical(path, base)))
}

/// Splits an optional `mode:` prefix off an environment entry.
///
/// A prefix that is not a known mode is part of the path, so Windows drive
/// letters such as `C:\data` stay intact.
fn split_mode_prefix(entry: &str) -> (AccessMode, &str) {
    if let Some((prefix, rest)) = entry.split_once(':') {
        if let Ok(mode) = prefix.parse::<AccessMode>() {
            return (mode, rest.trim());
        }
    }
    (AccessMode::ReadWrite, entry)
}

/// Parses the `[mode:]path` list from the environment variable.
#[must_use]
pub fn parse_env_roots(value: &str) -> Vec<(AccessMode, String)> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (mode, path) = split_mode_prefix(entry);
            (!path.is_empty()).then(|| (mode, path.to_string()))
        })
        .collect()
}

/// Merges roots by path, keeping the strongest mode for each.
///
/// The result does not depend on input order or repetition, and is sorted
/// by path.
#[must_use]
pub fn merge_roots(roots: impl IntoIterator<Item = AllowedRoot>) -> Vec<AllowedRoot> {
    roots
        .into_iter()
        .fold(BTreeMap::<PathBuf, AccessMode>::new(), |mut merged, root| {
            merged
                .entry(root.root)
                .and_modify(|mode| *mode = (*mode).max(root.mode))
                .or_insert(root.mode);
            merged
        })
        .into_iter()
        .map(|(root, mode)| AllowedRoot { root, mode })
        .collect()
}

/// Computes the current allowed roots from all sources.
#[must_use]
pub fn resolve_allowed_roots(sources: &RootSources) -> Vec<AllowedRoot> {
    let home = sources.home_dir();
    let mut raw: Vec<(AccessMode, PathBuf)> = Vec::new();

    // Only the current user's home is exposed, never the parent of all homes.
    for default in [&sources.install_dir, &sources.working_dir, &sources.home_dir]
        .into_iter()
        .flatten()
    {
        raw.push((AccessMode::ReadWrite, default.clone()));
    }

    if let Some(path) = sources.config_file() {
        if path.exists() {
            match config::from_path(path) {
                Ok(file) => {
                    for entry in file.roots {
                        match expand_home(&entry.path, home) {
                            Some(expanded) => raw.push((entry.mode, expanded)),
                            None => tracing::warn!(
                                path = %entry.path,
                                "Skipping config root: no home directory to expand '~'"
                            ),
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable roots config"),
            }
        }
    }

    if let Some(value) = sources.env().var(ROOTS_ENV_VAR) {
        for (mode, path) in parse_env_roots(&value) {
            match expand_home(&path, home) {
                Some(expanded) => raw.push((mode, expanded)),
                None => tracing::warn!(
                    path = %path,
                    "Skipping env root: no home directory to expand '~'"
                ),
            }
        }
    }

    let roots = merge_roots(raw.into_iter().filter_map(|(mode, path)| {
        normalize_root(&path, sources).map(|root| AllowedRoot { root, mode })
    }));

    tracing::trace!(count = roots.len(), "Resolved allowed roots");
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn normalized(path: &Path) -> PathBuf {
        normalize_path(path, Path::new("/")).unwrap()
    }

    #[test]
    fn defaults_are_read_write_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let sources = RootSources::new(dir.path())
            .with_install_dir(dir.path())
            .with_home_dir(dir.path());

        let roots = resolve_allowed_roots(&sources);

        assert_eq!(
            roots,
            vec![AllowedRoot::new(normalized(dir.path()), AccessMode::ReadWrite)]
        );
    }

    #[test]
    fn config_file_adds_roots_with_home_expansion() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let config = work.path().join("toolgate.toml");
        fs::write(
            &config,
            r#"
[[roots]]
path = "~/docs"
mode = "read-only"
"#,
        )
        .unwrap();

        let sources = RootSources::new(work.path())
            .with_home_dir(home.path())
            .with_config_file(&config);

        let roots = resolve_allowed_roots(&sources);

        assert!(roots.contains(&AllowedRoot::new(
            normalized(&home.path().join("docs")),
            AccessMode::ReadOnly
        )));
    }

    #[test]
    fn broken_config_contributes_nothing() {
        let work = TempDir::new().unwrap();
        let config = work.path().join("toolgate.toml");
        fs::write(&config, "[[roots]\nnot toml").unwrap();

        let sources = RootSources::new(work.path()).with_config_file(&config);

        assert_eq!(resolve_allowed_roots(&sources).len(), 1);
    }

    #[test]
    fn missing_config_contributes_nothing() {
        let work = TempDir::new().unwrap();
        let sources =
            RootSources::new(work.path()).with_config_file(work.path().join("absent.toml"));

        assert_eq!(resolve_allowed_roots(&sources).len(), 1);
    }

    #[test]
    fn env_var_entries_with_modes() {
        let work = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        let value = format!(
            "ro:{}, ,rw:{}/sub",
            extra.path().display(),
            work.path().display()
        );
        let sources = RootSources::new(work.path()).with_env(env(&[(ROOTS_ENV_VAR, &value)]));

        let roots = resolve_allowed_roots(&sources);

        assert!(roots.contains(&AllowedRoot::new(
            normalized(extra.path()),
            AccessMode::ReadOnly
        )));
        assert!(roots.contains(&AllowedRoot::new(
            normalized(&work.path().join("sub")),
            AccessMode::ReadWrite
        )));
    }

    #[test]
    fn env_read_only_cannot_downgrade_default() {
        let work = TempDir::new().unwrap();
        let value = format!("ro:{}", work.path().display());
        let sources = RootSources::new(work.path()).with_env(env(&[(ROOTS_ENV_VAR, &value)]));

        let roots = resolve_allowed_roots(&sources);

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].mode, AccessMode::ReadWrite);
    }

    #[test]
    fn trailing_separator_spellings_merge() {
        let work = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        let value = format!(
            "ro:{0}/,ro:{0}//,ro:{0}/./",
            extra.path().display()
        );
        let sources = RootSources::new(work.path()).with_env(env(&[(ROOTS_ENV_VAR, &value)]));

        assert_eq!(resolve_allowed_roots(&sources).len(), 2);
    }

    #[test]
    fn parse_env_roots_handles_prefixes() {
        assert_eq!(
            parse_env_roots("ro:/a, read-write:/b ,/c,,RW:/d"),
            vec![
                (AccessMode::ReadOnly, "/a".to_string()),
                (AccessMode::ReadWrite, "/b".to_string()),
                (AccessMode::ReadWrite, "/c".to_string()),
                (AccessMode::ReadWrite, "/d".to_string()),
            ]
        );
        assert_eq!(
            parse_env_roots(r"C:\data"),
            vec![(AccessMode::ReadWrite, r"C:\data".to_string())]
        );
        assert!(parse_env_roots("ro:").is_empty());
    }

    #[test]
    fn merge_is_order_independent() {
        let ro = AllowedRoot::new("/r", AccessMode::ReadOnly);
        let rw = AllowedRoot::new("/r", AccessMode::ReadWrite);

        let forward = merge_roots([ro.clone(), rw.clone()]);
        let reverse = merge_roots([rw.clone(), ro.clone()]);

        assert_eq!(forward, reverse);
        assert_eq!(forward, vec![rw.clone()]);
    }

    #[test]
    fn merge_is_idempotent() {
        let roots = vec![
            AllowedRoot::new("/b", AccessMode::ReadOnly),
            AllowedRoot::new("/a", AccessMode::ReadWrite),
            AllowedRoot::new("/b", AccessMode::ReadOnly),
        ];

        let once = merge_roots(roots.clone());
        let twice = merge_roots(once.clone());

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn relative_roots_need_a_working_dir() {
        let sources = RootSources {
            working_dir: None,
            ..RootSources::new("/unused")
        }
        .with_env(env(&[(ROOTS_ENV_VAR, "relative/dir")]));

        assert!(resolve_allowed_roots(&sources).is_empty());
    }
}
