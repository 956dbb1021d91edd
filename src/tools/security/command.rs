//! Command validation for shell execution.
//!
//! Two layers, in order:
//!
//! 1. Dangerous patterns are matched against the whole command line. A hit is
//!    final, whatever the base command is.
//! 2. The first whitespace-delimited token must be an allowlisted program.
//!
//! Arguments are not parsed. An allowlisted program with risky arguments is
//! an accepted residual risk of this layer.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Programs that may be launched, matched against the base command.
pub const ALLOWED_COMMANDS: &[&str] = &[
    // Version control
    "git",
    // Read-only inspection
    "ls", "dir", "pwd", "cat", "head", "tail", "wc", "tree", "stat", "file", "du", "df",
    "which", "where", "whoami", "echo", "date", "env", "uname",
    // Text search and processing
    "grep", "rg", "find", "fd", "diff", "sort", "uniq", "cut", "jq",
    // Language and package runtimes
    "node", "npm", "npx", "pnpm", "yarn", "bun", "deno", "python", "python3", "pip", "pip3",
    "uv", "cargo", "rustc", "go", "java", "javac", "mvn", "gradle", "dotnet", "make",
];

/// Executable extensions stripped before allowlist matching.
const EXECUTABLE_EXTENSIONS: &[&str] = &[".exe", ".cmd", ".bat", ".com", ".ps1"];

/// A named pattern that marks a command as catastrophic.
struct DangerousPattern {
    description: &'static str,
    regex: Regex,
}

fn pattern(description: &'static str, regex: &str) -> DangerousPattern {
    DangerousPattern {
        description,
        // Literal patterns, all exercised by the tests below.
        regex: Regex::new(regex).unwrap_or_else(|e| panic!("invalid dangerous pattern: {e}")),
    }
}

static DANGEROUS_PATTERNS: LazyLock<Vec<DangerousPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "recursive force delete",
            r"(?i)\brm\s+(?:\S+\s+)*-[a-z]*(?:r[a-z]*f|f[a-z]*r)",
        ),
        // Separate recursive and force flags, short or long, in either order,
        // within a single command of a compound line.
        pattern(
            "recursive force delete",
            r"(?i)\brm\s+(?:[^\s;&|]+\s+)*?(?:-[a-z]*r[a-z]*|--recursive)\s+(?:[^\s;&|]+\s+)*?(?:-[a-z]*f[a-z]*|--force)(?:\s|$|[;&|])",
        ),
        pattern(
            "recursive force delete",
            r"(?i)\brm\s+(?:[^\s;&|]+\s+)*?(?:-[a-z]*f[a-z]*|--force)\s+(?:[^\s;&|]+\s+)*?(?:-[a-z]*r[a-z]*|--recursive)(?:\s|$|[;&|])",
        ),
        pattern(
            "recursive force delete",
            r"(?i)\b(?:del|erase)\s+.*/s\b.*/q\b|\b(?:del|erase)\s+.*/q\b.*/s\b|\brd\s+.*/s\b.*/q\b|\brmdir\s+.*/s\b",
        ),
        pattern(
            "recursive force delete",
            r"(?i)\bremove-item\b.*-recurse\b.*-force\b|\bremove-item\b.*-force\b.*-recurse\b",
        ),
        pattern("filesystem format", r"(?i)\bmkfs(?:\.[a-z0-9]+)?\b"),
        pattern("filesystem format", r"(?i)\bformat(?:\.com)?\s+[a-z]:"),
        pattern("disk partitioning", r"(?i)\b(?:fdisk|sfdisk|gdisk|parted|diskpart|wipefs)\b"),
        pattern("raw disk write", r"(?i)\bdd\s+.*\bof=/dev/"),
        pattern(
            "raw disk write",
            r"(?i)>\s*/dev/(?:sd[a-z]|hd[a-z]|nvme\d|xvd[a-z]|vd[a-z]|disk\d|mmcblk\d)",
        ),
        pattern("fork bomb", r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:"),
        // Any later pipe stage whose program is a shell or interpreter, by
        // bare name or path, optionally behind sudo/doas/env and their flags.
        pattern(
            "remote content piped to shell",
            r"(?i)\b(?:curl|wget|iwr|invoke-webrequest|irm|invoke-restmethod)\b[^;&]*?\|\s*(?:(?:sudo|doas|env)(?:\s+-\S+(?:\s+[^-\s|]\S*)?)*\s+|[a-z_][a-z0-9_]*=\S*\s+)*(?:\S*[/\\])?(?:(?:ba|z|k|da|fi|c|tc|a)?sh|iex|invoke-expression|python[0-9.]*|perl|ruby|node|php)(?:\.exe)?(?:\s|$|[;&|)])",
        ),
    ]
});

/// Outcome of a command validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandValidationResult {
    /// Whether the command may run
    pub valid: bool,
    /// Why the command was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The trimmed command with whitespace runs collapsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_command: Option<String>,
}

impl CommandValidationResult {
    fn accepted(normalized: String) -> Self {
        Self {
            valid: true,
            reason: None,
            normalized_command: Some(normalized),
        }
    }

    fn rejected(reason: String, normalized: Option<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            normalized_command: normalized,
        }
    }
}

/// Validates command lines against dangerous patterns and an allowlist.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    allowed: Vec<String>,
}

impl CommandValidator {
    /// Creates a validator with the default allowlist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed: ALLOWED_COMMANDS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Adds a program to the allowlist.
    #[must_use]
    pub fn with_allowed_command(mut self, command: impl Into<String>) -> Self {
        self.allowed.push(command.into());
        self
    }

    /// Returns the allowlist.
    #[must_use]
    pub fn allowed_commands(&self) -> &[String] {
        &self.allowed
    }

    /// Validates a raw command line.
    pub fn validate(&self, command: &str) -> CommandValidationResult {
        let result = self.check(command);
        match &result.reason {
            None => tracing::debug!(command, "Command accepted"),
            Some(reason) => tracing::warn!(command, reason = %reason, "Command rejected"),
        }
        result
    }

    fn check(&self, command: &str) -> CommandValidationResult {
        let normalized = command.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return CommandValidationResult::rejected("command is empty".to_string(), None);
        }

        // Patterns see the raw line so whitespace tricks cannot hide them.
        if let Some(hit) = DANGEROUS_PATTERNS.iter().find(|p| p.regex.is_match(command)) {
            return CommandValidationResult::rejected(
                format!("dangerous command pattern: {}", hit.description),
                Some(normalized),
            );
        }

        let base = normalized.split(' ').next().unwrap_or_default();
        if self.is_allowed_base(base) {
            CommandValidationResult::accepted(normalized)
        } else {
            CommandValidationResult::rejected(
                format!("command not in allowlist: '{base}'"),
                Some(normalized),
            )
        }
    }

    /// Returns true if the base command names an allowlisted program.
    ///
    /// A full path such as `/usr/bin/git` or `C:\Git\bin\git.exe` matches
    /// when its final component does.
    fn is_allowed_base(&self, base: &str) -> bool {
        let base = strip_quotes(base);
        let program = base.rsplit(['/', '\\']).next().unwrap_or(base);
        let program = strip_executable_extension(program);

        self.allowed.iter().any(|allowed| {
            if cfg!(windows) {
                program.eq_ignore_ascii_case(allowed)
            } else {
                program == allowed.as_str()
            }
        })
    }
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a command with the default allowlist.
#[must_use]
pub fn validate_command(command: &str) -> CommandValidationResult {
    CommandValidator::new().validate(command)
}

fn strip_quotes(token: &str) -> &str {
    token.trim_matches(|c| c == '"' || c == '\'')
}

fn strip_executable_extension(program: &str) -> &str {
    let lower = program.to_ascii_lowercase();
    EXECUTABLE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or(program, |ext| &program[..program.len() - ext.len()])
}
