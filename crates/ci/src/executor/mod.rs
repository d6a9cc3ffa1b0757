//! Pipeline Executor
//!
//! Executes compiled pipelines: steps strictly in order, conditions
//! evaluated per step, the first fatal failure halting the run, and cache
//! saves registered by `actions/cache` running only after a successful run.

pub mod commands;
pub mod config;
mod engine;
pub mod runner;
pub mod shell;

pub use commands::{FileCommandError, FileCommandOutput, FileCommands};
pub use config::ExecutorConfig;
pub use engine::PipelineExecutor;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, RunnerError};
pub use shell::Shell;

use std::path::PathBuf;
use thiserror::Error;

/// Error types for pipeline execution
///
/// Step failures are not errors: they are recorded in the run result.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The workspace directory does not exist
    #[error("Workspace {} does not exist", path.display())]
    Workspace { path: PathBuf },

    /// The per-run temporary directory could not be created
    #[error("Failed to create runner directory: {source}")]
    RunnerDirectory {
        #[source]
        source: std::io::Error,
    },

    /// Data directories could not be resolved
    #[error(transparent)]
    Core(#[from] stepwise_core::Error),
}

impl From<ExecutorError> for stepwise_core::Error {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Workspace { path } => Self::configuration_with_help(
                format!("workspace {} does not exist", path.display()),
                "pass --workspace pointing at the repository checkout",
            ),
            ExecutorError::RunnerDirectory { source } => {
                Self::io(source, std::env::temp_dir(), "create_runner_dir")
            }
            ExecutorError::Core(err) => err,
        }
    }
}
