use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use stepwise_ci::pipeline::CompileError;
use stepwise_ci::workflow::WorkflowError;
use stepwise_ci::{EventKind, RunStatus};
use stepwise_core::config::CachePolicy;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// A pipeline step failed
pub const EXIT_FAILED: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Unexpected error exit code
pub const EXIT_OTHER: i32 = 3;
/// Interrupted (128 + SIGINT)
pub const EXIT_SIGINT: i32 = 130;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(stepwise::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// The workflow file is invalid (exit code 2)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Workflow(#[from] WorkflowError),
    /// The workflow cannot be compiled (exit code 2)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
    /// The pipeline ran and did not succeed (exit code 1, or 130 when interrupted)
    #[error("{message}")]
    #[diagnostic(code(stepwise::cli::failed))]
    Failed {
        /// Summary line
        message: String,
        /// Status that produced the failure
        status: RunStatus,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(stepwise::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a failure for a run that did not succeed
    #[must_use]
    pub fn failed(message: impl Into<String>, status: RunStatus) -> Self {
        Self::Failed {
            message: message.into(),
            status,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error with help text
    #[must_use]
    pub fn other_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } | Self::Workflow(_) | Self::Compile(_) => "config",
            Self::Failed { .. } => "failed",
            Self::Other { .. } => "other",
        }
    }
}

/// Convert `stepwise_core::Error` to appropriate `CliError` variant.
///
/// Configuration, workflow and expression errors are the user's to fix
/// (exit code 2); everything else is unexpected (exit code 3).
impl From<stepwise_core::Error> for CliError {
    fn from(err: stepwise_core::Error) -> Self {
        match err {
            stepwise_core::Error::Configuration { message, help } => Self::Config { message, help },
            stepwise_core::Error::Workflow { .. } | stepwise_core::Error::Expression { .. } => {
                Self::config(err.to_string())
            }
            stepwise_core::Error::EnvironmentSetup { message, help }
            | stepwise_core::Error::Execution { message, help } => Self::Other { message, help },
            stepwise_core::Error::Cache { message } => Self::other_with_help(
                message,
                "Run with --cache-policy disabled to bypass the dependency cache",
            ),
            stepwise_core::Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::other_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } | CliError::Workflow(_) | CliError::Compile(_) => EXIT_CLI,
        CliError::Failed { status, .. } => status.exit_code(),
        CliError::Other { .. } => EXIT_OTHER,
    }
}

/// Render error appropriately based on JSON flag
pub fn render_error(err: CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": err.code(),
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else if let CliError::Failed { message, .. } = &err {
        // The step output and summary already explain the failure
        eprintln!("{message}");
    } else {
        let report = Report::new(err);
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Run a GitHub Actions style workflow locally.
#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(about = "Run GitHub Actions style CI workflows locally, step by step")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    /// Emit JSON events and results.
    #[arg(long, global = true, help = "Emit JSON events and results")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow.
    #[command(about = "Run a workflow")]
    Run(RunArgs),
    /// Print the compiled steps without running them.
    #[command(about = "Print the compiled steps without running them")]
    Plan(SelectArgs),
    /// Write a starter workflow.
    #[command(about = "Write the Python package workflow")]
    Init(InitArgs),
    /// Inspect and manage the dependency cache.
    #[command(about = "Inspect and manage the dependency cache")]
    Cache {
        /// Cache subcommand to execute.
        #[command(subcommand)]
        subcommand: CacheCommands,
    },
}

/// Trigger events that can be simulated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EventArg {
    /// Push to a branch
    Push,
    /// Pull request targeting a branch
    #[value(name = "pull_request", alias = "pull-request")]
    PullRequest,
    /// Manual dispatch
    #[value(name = "workflow_dispatch")]
    WorkflowDispatch,
}

impl From<EventArg> for EventKind {
    fn from(event: EventArg) -> Self {
        match event {
            EventArg::Push => Self::Push,
            EventArg::PullRequest => Self::PullRequest,
            EventArg::WorkflowDispatch => Self::Manual,
        }
    }
}

/// Cache policies accepted on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CachePolicyArg {
    /// Restore and save
    Normal,
    /// Restore only
    Readonly,
    /// Save only
    Writeonly,
    /// Neither
    Disabled,
}

impl From<CachePolicyArg> for CachePolicy {
    fn from(policy: CachePolicyArg) -> Self {
        match policy {
            CachePolicyArg::Normal => Self::Normal,
            CachePolicyArg::Readonly => Self::Readonly,
            CachePolicyArg::Writeonly => Self::Writeonly,
            CachePolicyArg::Disabled => Self::Disabled,
        }
    }
}

/// Workflow, job and trigger selection shared by `run` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Workflow file (relative to the workspace).
    #[arg(long, short = 'w', help = "Workflow file [default: from stepwise.toml, else .github/workflows/python-package.yml]")]
    pub workflow: Option<PathBuf>,
    /// Only this job.
    #[arg(long, help = "Only run this job")]
    pub job: Option<String>,
    /// Matrix filters.
    #[arg(
        long = "matrix",
        short = 'm',
        value_name = "KEY=VALUE",
        value_parser = parse_key_value,
        help = "Only matrix combinations with KEY=VALUE (repeatable)"
    )]
    pub matrix: Vec<(String, String)>,
    /// Simulated event.
    #[arg(long, value_enum, help = "Trigger event [default: detected]")]
    pub event: Option<EventArg>,
    /// Simulated branch.
    #[arg(long, help = "Branch the event targets [default: detected]")]
    pub branch: Option<String>,
    /// Repository checkout.
    #[arg(long, help = "Repository checkout [default: current directory]")]
    pub workspace: Option<PathBuf>,
}

/// `stepwise run` arguments.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Selection.
    #[command(flatten)]
    pub select: SelectArgs,
    /// Data directory for the dependency cache and tool cache.
    #[arg(long, env = "STEPWISE_CACHE_DIR", help = "Cache directory")]
    pub cache_dir: Option<PathBuf>,
    /// Cache policy.
    #[arg(long, value_enum, help = "Dependency cache policy [default: normal]")]
    pub cache_policy: Option<CachePolicyArg>,
    /// JSON report destination.
    #[arg(long, help = "Write a JSON report to this file")]
    pub report: Option<PathBuf>,
    /// Ignore trigger filters.
    #[arg(long, help = "Run even when the event does not match the workflow triggers")]
    pub force: bool,
}

/// `stepwise init` arguments.
#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Source directory checked by the linters.
    #[arg(long, default_value = "bcdi", help = "Package source directory")]
    pub package: String,
    /// Branch the triggers filter on.
    #[arg(long, default_value = "main", help = "Branch that triggers the workflow")]
    pub branch: String,
    /// Interpreter versions.
    #[arg(
        long = "python",
        default_value = "3.9",
        help = "Python version for the matrix (repeatable)"
    )]
    pub python: Vec<String>,
    /// Runner label.
    #[arg(long, default_value = "ubuntu-latest", help = "Runner label")]
    pub os: String,
    /// Destination.
    #[arg(
        long,
        short = 'o',
        default_value = crate::commands::DEFAULT_WORKFLOW,
        help = "Output file (relative to the workspace)"
    )]
    pub output: PathBuf,
    /// Overwrite.
    #[arg(long, help = "Overwrite an existing file")]
    pub force: bool,
    /// Repository checkout.
    #[arg(long, help = "Repository checkout [default: current directory]")]
    pub workspace: Option<PathBuf>,
}

/// Cache subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// Print the dependency cache key for the workspace.
    #[command(about = "Print the pip cache key for the workspace")]
    Key {
        /// Runner label.
        #[arg(long, default_value = "ubuntu-latest", help = "Runner label in the key")]
        os: String,
        /// Dependency manifest.
        #[arg(long, default_value = "requirements.txt", help = "Manifest to hash")]
        manifest: String,
        /// Repository checkout.
        #[arg(long, help = "Repository checkout [default: current directory]")]
        workspace: Option<PathBuf>,
    },
    /// List cache entries.
    #[command(about = "List cache entries")]
    List {
        /// Data directory.
        #[arg(long, env = "STEPWISE_CACHE_DIR", help = "Cache directory")]
        cache_dir: Option<PathBuf>,
    },
    /// Remove cache entries.
    #[command(about = "Remove cache entries")]
    Clear {
        /// Only keys with this prefix.
        #[arg(long, help = "Only remove keys starting with PREFIX")]
        prefix: Option<String>,
        /// Data directory.
        #[arg(long, env = "STEPWISE_CACHE_DIR", help = "Cache directory")]
        cache_dir: Option<PathBuf>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Parse command line arguments into a CLI structure.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing::LogLevel;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["stepwise", "run"]).unwrap();
        assert!(matches!(cli.level, LogLevel::Warn));
        assert!(!cli.json);
        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.select.workflow.is_none());
        assert!(args.select.matrix.is_empty());
        assert!(args.cache_policy.is_none());
        assert!(!args.force);
    }

    #[test]
    fn test_run_selection_flags() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "--json",
            "-L",
            "debug",
            "run",
            "--workflow",
            "ci.yml",
            "--job",
            "build",
            "-m",
            "python-version=3.9",
            "--matrix",
            "os = ubuntu-latest",
            "--event",
            "pull_request",
            "--branch",
            "main",
            "--cache-policy",
            "readonly",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.level, LogLevel::Debug));
        let Commands::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(args.select.job.as_deref(), Some("build"));
        assert_eq!(
            args.select.matrix,
            vec![
                ("python-version".to_string(), "3.9".to_string()),
                ("os".to_string(), "ubuntu-latest".to_string()),
            ]
        );
        assert_eq!(args.select.event, Some(EventArg::PullRequest));
        assert_eq!(
            CachePolicy::from(args.cache_policy.unwrap()),
            CachePolicy::Readonly
        );
    }

    #[test]
    fn test_invalid_matrix_filter() {
        assert!(Cli::try_parse_from(["stepwise", "plan", "--matrix", "nokey"]).is_err());
        assert!(Cli::try_parse_from(["stepwise", "plan", "--matrix", "=1"]).is_err());
    }

    #[test]
    fn test_init_defaults() {
        let cli = Cli::try_parse_from(["stepwise", "init", "--python", "3.10", "--python", "3.11"])
            .unwrap();
        let Commands::Init(args) = cli.command else {
            panic!("Expected Init command");
        };
        assert_eq!(args.package, "bcdi");
        assert_eq!(args.python, vec!["3.10", "3.11"]);
        assert_eq!(args.output, PathBuf::from(crate::commands::DEFAULT_WORKFLOW));
    }

    #[test]
    fn test_cache_subcommands() {
        let cli = Cli::try_parse_from(["stepwise", "cache", "clear", "--prefix", "ubuntu-"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                subcommand: CacheCommands::Clear { prefix: Some(_), .. }
            }
        ));
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["stepwise"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::config("bad")), EXIT_CLI);
        assert_eq!(exit_code_for(&CliError::other("boom")), EXIT_OTHER);
        assert_eq!(
            exit_code_for(&CliError::failed("failed", RunStatus::Failed)),
            EXIT_FAILED
        );
        assert_eq!(
            exit_code_for(&CliError::failed("cancelled", RunStatus::Cancelled)),
            EXIT_SIGINT
        );
    }

    #[test]
    fn test_core_error_conversion() {
        let err: CliError = stepwise_core::Error::configuration("no workflow").into();
        assert!(matches!(err, CliError::Config { .. }));
        let err: CliError = stepwise_core::Error::execution("spawn failed").into();
        assert_eq!(exit_code_for(&err), EXIT_OTHER);
    }

    #[test]
    fn test_envelopes() {
        let json = serde_json::to_string(&OkEnvelope::new("data")).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        let json = serde_json::to_string(&ErrorEnvelope::new("oops")).unwrap();
        assert!(json.contains("\"status\":\"error\""));
    }
}
