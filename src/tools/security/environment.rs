//! Environment access and sensitive-variable filtering.
//!
//! Environment reads go through [`EnvSource`] so the resolver and the filter
//! can be driven by a plain map in tests instead of the real process.

use std::collections::{BTreeMap, HashMap};

/// Substrings that mark a variable name as sensitive (matched case-insensitively).
pub const SENSITIVE_KEYWORDS: &[&str] = &["key", "token", "secret", "password", "credential", "auth"];

/// A readable set of environment variables.
pub trait EnvSource: Send + Sync {
    /// Returns the value of a variable, if set.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns every variable as `(name, value)` pairs.
    fn vars(&self) -> Vec<(String, String)>;
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        // vars() panics on non-UTF-8 entries; skip those instead
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Returns true if the variable name contains a sensitive keyword.
#[must_use]
pub fn is_sensitive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Copies the environment, dropping every sensitive variable.
///
/// Sensitive variables are removed outright rather than masked, so the
/// result reveals nothing about which secrets exist.
#[must_use]
pub fn filter_sensitive_environment(env: &dyn EnvSource) -> BTreeMap<String, String> {
    let mut removed = 0usize;
    let filtered: BTreeMap<String, String> = env
        .vars()
        .into_iter()
        .filter(|(name, _)| {
            let sensitive = is_sensitive_name(name);
            if sensitive {
                removed += 1;
            }
            !sensitive
        })
        .collect();

    tracing::debug!(kept = filtered.len(), removed, "Filtered environment");
    filtered
}

/// Filters the real process environment.
#[must_use]
pub fn filter_process_environment() -> BTreeMap<String, String> {
    filter_sensitive_environment(&ProcessEnv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn removes_sensitive_names() {
        let source = env(&[
            ("PATH", "/usr/bin"),
            ("HOME", "/home/dev"),
            ("OPENAI_API_KEY", "sk-123"),
            ("GITHUB_TOKEN", "ghp_abc"),
            ("DB_PASSWORD", "hunter2"),
            ("CLIENT_SECRET", "s"),
            ("AWS_CREDENTIALS_FILE", "/x"),
            ("AUTHORIZATION", "Bearer y"),
        ]);

        let filtered = filter_sensitive_environment(&source);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert!(filtered.contains_key("HOME"));
    }

    #[test]
    fn matching_ignores_case_and_position() {
        for name in ["api_key", "MyToken", "x_SeCrEt_y", "oauthstate", "MONKEY"] {
            assert!(is_sensitive_name(name), "{name} should be sensitive");
        }
        for name in ["PATH", "LANG", "TERM", "SHELL"] {
            assert!(!is_sensitive_name(name), "{name} should not be sensitive");
        }
    }

    #[test]
    fn never_returns_a_sensitive_key() {
        let source = env(&[
            ("a_KEY", "1"),
            ("Token_b", "2"),
            ("PassWord", "3"),
            ("credentialHelper", "4"),
            ("plain", "5"),
        ]);

        let filtered = filter_sensitive_environment(&source);

        assert!(filtered.keys().all(|k| !is_sensitive_name(k)));
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["plain"]);
    }

    #[test]
    fn empty_environment_yields_empty_map() {
        let source: HashMap<String, String> = HashMap::new();
        assert!(filter_sensitive_environment(&source).is_empty());
    }

    #[test]
    fn process_environment_is_filtered() {
        let filtered = filter_process_environment();
        assert!(filtered.keys().all(|k| !is_sensitive_name(k)));
    }
}
