//! Core types and error handling for stepwise.
//!
//! This crate holds the pieces shared by every other stepwise crate:
//! - [`Error`], the workspace-wide error type rendered through `miette`
//! - [`paths`], platform-appropriate data directories
//! - [`config`], the optional `stepwise.toml` configuration file

pub mod config;
pub mod paths;

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Main error type for stepwise operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The workflow, configuration file or command line is invalid.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(stepwise::config))]
    Configuration {
        /// What is wrong.
        message: String,
        /// How to fix it.
        #[help]
        help: Option<String>,
    },

    /// A workflow file could not be parsed.
    #[error("Workflow error in {}: {message}", path.display())]
    #[diagnostic(code(stepwise::workflow))]
    Workflow {
        /// Workflow file path.
        path: Box<Path>,
        /// Parser message.
        message: String,
    },

    /// A `${{ }}` expression is malformed or failed to evaluate.
    #[error("Expression error: {message}")]
    #[diagnostic(code(stepwise::expression))]
    Expression {
        /// Rendered expression diagnostic.
        message: String,
    },

    /// The step environment (interpreter, workspace) could not be prepared.
    #[error("Environment setup failed: {message}")]
    #[diagnostic(code(stepwise::environment))]
    EnvironmentSetup {
        /// What failed.
        message: String,
        /// How to fix it.
        #[help]
        help: Option<String>,
    },

    /// Running the pipeline failed for a reason other than a step exit code.
    #[error("Execution error: {message}")]
    #[diagnostic(code(stepwise::execution))]
    Execution {
        /// What failed.
        message: String,
        /// How to fix it.
        #[help]
        help: Option<String>,
    },

    /// A dependency cache operation failed.
    #[error("Cache error: {message}")]
    #[diagnostic(code(stepwise::cache))]
    Cache {
        /// What failed.
        message: String,
    },

    /// Filesystem or process I/O failed.
    #[error("I/O {operation} failed{}", path.as_ref().map(|p| format!(" on {}", p.display())).unwrap_or_default())]
    #[diagnostic(code(stepwise::io))]
    Io {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path involved, if any.
        path: Option<Box<Path>>,
        /// Operation being performed.
        operation: String,
    },
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text.
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a workflow parse error.
    #[must_use]
    pub fn workflow(path: &Path, message: impl Into<String>) -> Self {
        Self::Workflow {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an expression error.
    #[must_use]
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    /// Create an environment setup error with optional help.
    #[must_use]
    pub fn environment_setup(message: impl Into<String>, help: Option<String>) -> Self {
        Self::EnvironmentSetup {
            message: message.into(),
            help,
        }
    }

    /// Create an execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            help: None,
        }
    }

    /// Create a cache error.
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "operation".to_string(),
        }
    }
}

/// Result type alias for stepwise operations.
pub type Result<T> = std::result::Result<T, Error>;
