//! Validated shell command execution.
//!
//! A command runs only after it passes the command validator and its working
//! directory passes the path validator. The child sees a filtered copy of the
//! environment with secret-looking variables removed.

use crate::error::SandboxError;
use crate::tools::security::{
    filter_sensitive_environment, CommandValidator, EnvSource, PathOperation, PathValidator,
    ProcessEnv,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Default command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on any requested timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum output size to capture per stream (1MB).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Shell command line
    pub command: String,
    /// Working directory (default: the configured working directory)
    pub cwd: Option<String>,
    /// Timeout (default: 120s, max: 600s)
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// Creates a request for a command line.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout: None,
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Exit code, or -1 if the process was terminated by a signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Whether the process exited successfully
    pub success: bool,
    /// Whether either stream was truncated
    pub truncated: bool,
}

/// Runs shell commands behind the command and path validators.
#[derive(Clone)]
pub struct CommandRunner {
    commands: CommandValidator,
    paths: PathValidator,
    env: Arc<dyn EnvSource>,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner")
            .field("commands", &self.commands)
            .field("paths", &self.paths)
            .field("default_timeout", &self.default_timeout)
            .field("max_timeout", &self.max_timeout)
            .finish_non_exhaustive()
    }
}

impl CommandRunner {
    /// Creates a runner that passes the filtered process environment to
    /// children.
    #[must_use]
    pub fn new(commands: CommandValidator, paths: PathValidator) -> Self {
        Self {
            commands,
            paths,
            env: Arc::new(ProcessEnv),
            default_timeout: DEFAULT_TIMEOUT,
            max_timeout: MAX_TIMEOUT,
        }
    }

    /// Sets the environment children inherit (after filtering).
    #[must_use]
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Sets custom timeout bounds.
    #[must_use]
    pub fn with_timeouts(mut self, default_timeout: Duration, max_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self.max_timeout = max_timeout;
        self
    }

    /// Returns the command validator.
    #[must_use]
    pub fn commands(&self) -> &CommandValidator {
        &self.commands
    }

    /// Returns the path validator used for working directories.
    #[must_use]
    pub fn paths(&self) -> &PathValidator {
        &self.paths
    }

    /// Validates and runs a command, capturing its output.
    ///
    /// A non-zero exit is not an error; check [`CommandOutput::success`].
    ///
    /// # Errors
    ///
    /// Security validation of the command or working directory, a missing
    /// working directory, spawn failure, or timeout.
    pub async fn run(&self, request: CommandRequest) -> Result<CommandOutput, SandboxError> {
        let verdict = self.commands.validate(&request.command);
        if !verdict.valid {
            let reasons = verdict.reason.into_iter().collect();
            return Err(SandboxError::security_validation(&request.command, reasons));
        }

        let cwd = self.authorize_cwd(request.cwd.as_deref())?;
        let timeout = request
            .timeout
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout);

        let mut cmd = shell_command(&request.command);
        cmd.env_clear()
            .envs(filter_sensitive_environment(self.env.as_ref()))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(ref dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SandboxError::execution_failed(format!("failed to spawn process: {e}")))?;

        tracing::debug!(command = %request.command, cwd = ?cwd, timeout_ms = timeout.as_millis() as u64, "Running command");

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SandboxError::execution_failed(format!("process error: {e}")));
            }
            Err(_) => {
                tracing::warn!(command = %request.command, timeout_ms = timeout.as_millis() as u64, "Command timed out");
                return Err(SandboxError::timeout(&request.command, timeout));
            }
        };

        let (stdout, stdout_truncated) = truncate_output(&String::from_utf8_lossy(&output.stdout));
        let (stderr, stderr_truncated) = truncate_output(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
            success: output.status.success(),
            truncated: stdout_truncated || stderr_truncated,
        })
    }

    /// Validates the working directory and returns its absolute form.
    fn authorize_cwd(&self, cwd: Option<&str>) -> Result<Option<PathBuf>, SandboxError> {
        let working_dir = self.paths.sources().working_dir();
        let requested = match (cwd, working_dir) {
            (Some(dir), _) => dir.to_string(),
            (None, Some(dir)) => dir.to_string_lossy().into_owned(),
            (None, None) => return Ok(None),
        };

        let result = self.paths.validate(&requested, PathOperation::List);
        if !result.valid {
            return Err(SandboxError::security_validation(&requested, result.reasons));
        }

        let Some(dir) = self.paths.absolute_path(&requested) else {
            return Err(SandboxError::security_validation(&requested, vec!["invalid path".into()]));
        };
        if !dir.is_dir() {
            return Err(SandboxError::execution_failed(format!(
                "working directory does not exist or is not a directory: {requested}"
            )));
        }
        Ok(Some(dir))
    }
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Truncates output if it exceeds the maximum size, preferring a line
/// boundary.
fn truncate_output(output: &str) -> (String, bool) {
    if output.len() <= MAX_OUTPUT_SIZE {
        return (output.to_string(), false);
    }

    let mut end = MAX_OUTPUT_SIZE;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    let cut = output[..end].rfind('\n').unwrap_or(end);
    (
        format!(
            "{}\n\n... (output truncated, {} bytes total)",
            &output[..cut],
            output.len()
        ),
        true,
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::security::RootSources;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn runner(dir: &Path) -> CommandRunner {
        CommandRunner::new(
            CommandValidator::new(),
            PathValidator::new(RootSources::new(dir)),
        )
    }

    #[tokio::test]
    async fn runs_simple_command() {
        let dir = TempDir::new().unwrap();
        let output = runner(dir.path())
            .run(CommandRequest::new("echo 'hello world'"))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello world"));
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn captures_stderr_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let output = runner(dir.path())
            .run(CommandRequest::new("ls definitely-not-here"))
            .await
            .unwrap();

        assert!(!output.success);
        assert_ne!(output.exit_code, 0);
        assert!(!output.stderr.is_empty());
    }

    #[tokio::test]
    async fn defaults_to_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let output = runner(dir.path())
            .run(CommandRequest::new("ls"))
            .await
            .unwrap();

        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn runs_in_requested_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let output = runner(dir.path())
            .run(CommandRequest::new("pwd").with_cwd("sub"))
            .await
            .unwrap();

        assert!(output.stdout.trim_end().ends_with("sub"));
    }

    #[tokio::test]
    async fn rejects_command_outside_allowlist() {
        let dir = TempDir::new().unwrap();
        let error = runner(dir.path())
            .run(CommandRequest::new("curl https://example.com"))
            .await
            .unwrap_err();

        assert!(error.is_security_validation());
        assert!(error.reasons().unwrap()[0].contains("not in allowlist"));
    }

    #[tokio::test]
    async fn rejects_dangerous_command() {
        let dir = TempDir::new().unwrap();
        let error = runner(dir.path())
            .run(CommandRequest::new("rm -rf /"))
            .await
            .unwrap_err();

        assert!(error.reasons().unwrap()[0].contains("dangerous"));
    }

    #[tokio::test]
    async fn rejects_cwd_outside_roots() {
        let allowed = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();

        let error = runner(allowed.path())
            .run(CommandRequest::new("ls").with_cwd(outside.path().to_string_lossy()))
            .await
            .unwrap_err();

        assert!(error.is_security_validation());
    }

    #[tokio::test]
    async fn rejects_missing_cwd() {
        let dir = TempDir::new().unwrap();
        let error = runner(dir.path())
            .run(CommandRequest::new("ls").with_cwd("nope"))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("not a directory"));
    }

    #[tokio::test]
    async fn child_environment_is_filtered() {
        let dir = TempDir::new().unwrap();
        let env: HashMap<String, String> = [
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("VISIBLE_SETTING".to_string(), "shown".to_string()),
            ("GITHUB_TOKEN".to_string(), "ghp_hidden".to_string()),
        ]
        .into_iter()
        .collect();

        let output = runner(dir.path())
            .with_env(env)
            .run(CommandRequest::new("env"))
            .await
            .unwrap();

        assert!(output.stdout.contains("VISIBLE_SETTING=shown"));
        assert!(!output.stdout.contains("GITHUB_TOKEN"));
        assert!(!output.stdout.contains("ghp_hidden"));
    }

    #[tokio::test]
    async fn times_out_long_command() {
        let dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(
            CommandValidator::new().with_allowed_command("sleep"),
            PathValidator::new(RootSources::new(dir.path())),
        );

        let error = runner
            .run(CommandRequest::new("sleep 5").with_timeout(Duration::from_millis(200)))
            .await
            .unwrap_err();

        assert!(error.is_retriable());
        assert!(error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn timeout_is_clamped_to_max() {
        let dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(
            CommandValidator::new().with_allowed_command("sleep"),
            PathValidator::new(RootSources::new(dir.path())),
        )
        .with_timeouts(Duration::from_secs(1), Duration::from_millis(200));

        let error = runner
            .run(CommandRequest::new("sleep 5").with_timeout(Duration::from_secs(60)))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("timed out"));
    }

    #[test]
    fn truncate_output_short_is_unchanged() {
        let (out, truncated) = truncate_output("short\n");
        assert_eq!(out, "short\n");
        assert!(!truncated);
    }

    #[test]
    fn truncate_output_cuts_at_line_boundary() {
        let line = "x".repeat(1023) + "\n";
        let output = line.repeat(2048);

        let (out, truncated) = truncate_output(&output);

        assert!(truncated);
        assert!(out.contains("output truncated"));
        let kept = out.split("\n\n...").next().unwrap();
        assert!(kept.len() < MAX_OUTPUT_SIZE);
        assert!(kept.ends_with('x'));
    }

    #[test]
    fn truncate_output_respects_char_boundaries() {
        let output = "é".repeat(MAX_OUTPUT_SIZE);

        let (out, truncated) = truncate_output(&output);

        assert!(truncated);
        assert!(out.starts_with('é'));
    }
}
