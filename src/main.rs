//! Toolgate CLI - inspect and exercise the sandbox from a shell.
//!
//! Results are printed to stdout as JSON; logs go to stderr or, with
//! `--log-dir`, to a rolling file. Exit code 2 means the sandbox rejected the
//! request.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use toolgate::logging::{init_file_logging, init_stderr_logging, LogLevel};
use toolgate::prelude::*;
use toolgate::tools::security::ProcessEnv;
use toolgate::tools::DEFAULT_MAX_READ_BYTES;

/// Exit code for a rejected path, command or file operation.
const REJECTED: u8 = 2;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(about = "Validate paths and commands against the tool sandbox")]
#[command(version)]
struct Cli {
    /// Log level (RUST_LOG overrides)
    #[arg(long, global = true, env = "TOOLGATE_LOG_LEVEL", default_value = "warn")]
    log_level: LogLevel,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective allowed roots
    Roots,
    /// Validate a path for an operation
    CheckPath {
        /// Path to validate
        path: String,
        /// Operation: read, write or list
        #[arg(long, default_value = "read")]
        op: PathOperation,
    },
    /// Validate a command line
    CheckCommand {
        /// Command line to validate
        command: String,
    },
    /// Print which environment variables children would inherit
    Env,
    /// List a directory through the sandbox
    List {
        /// Directory to list
        path: String,
    },
    /// Read a text file through the sandbox
    Read {
        /// File to read
        path: String,
        /// Size limit in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_READ_BYTES)]
        max_bytes: u64,
    },
    /// Run a command through the sandbox
    Run {
        /// Command line to run
        command: String,
        /// Working directory
        #[arg(long)]
        cwd: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let sources = RootSources::from_process();
    tracing::debug!(?sources, "Resolved sandbox inputs");

    match cli.command {
        Command::Roots => {
            let roots = resolve_allowed_roots(&sources);
            print_json(&json!({
                "config_file": sources.config_file(),
                "roots": roots,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckPath { path, op } => {
            let result = PathValidator::new(sources).validate(&path, op);
            print_json(&result)?;
            Ok(verdict(result.valid))
        }
        Command::CheckCommand { command } => {
            let result = validate_command(&command);
            print_json(&result)?;
            Ok(verdict(result.valid))
        }
        Command::Env => {
            let kept = filter_process_environment();
            let total = ProcessEnv.vars().len();
            print_json(&json!({
                "inherited": kept.keys().collect::<Vec<_>>(),
                "removed": total.saturating_sub(kept.len()),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List { path } => {
            let files = SafeFileAccessor::new(PathValidator::new(sources));
            match files.list(&path).await {
                Ok(entries) => {
                    print_json(&entries)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report(e),
            }
        }
        Command::Read { path, max_bytes } => {
            let files = SafeFileAccessor::new(PathValidator::new(sources));
            match files.read(&path, max_bytes).await {
                Ok(text) => {
                    print!("{text}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report(e),
            }
        }
        Command::Run {
            command,
            cwd,
            timeout,
        } => {
            let runner = CommandRunner::new(CommandValidator::new(), PathValidator::new(sources));
            let mut request = CommandRequest::new(command);
            if let Some(cwd) = cwd {
                request = request.with_cwd(cwd);
            }
            if let Some(secs) = timeout {
                request = request.with_timeout(Duration::from_secs(secs));
            }
            match runner.run(request).await {
                Ok(output) => {
                    print_json(&output)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report(e),
            }
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    match cli.log_dir {
        Some(ref dir) => {
            init_file_logging(dir, cli.log_level).context("failed to initialize file logging")
        }
        None => init_stderr_logging(cli.log_level).context("failed to initialize logging"),
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

fn verdict(valid: bool) -> ExitCode {
    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(REJECTED)
    }
}

/// Prints a rejection as JSON; other failures propagate.
fn report(error: SandboxError) -> Result<ExitCode> {
    match error.reasons() {
        Some(reasons) => {
            print_json(&json!({
                "valid": false,
                "reasons": reasons,
            }))?;
            Ok(ExitCode::from(REJECTED))
        }
        None => Err(error.into()),
    }
}
