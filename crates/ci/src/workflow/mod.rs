//! Workflow files: schema, matrix expansion and YAML loading.

#![allow(unused_assignments)] // False positives from miette derive macro

mod matrix;
mod schema;

pub use matrix::{Combination, Matrix};
pub use schema::{
    Defaults, Job, PullRequestTrigger, PushTrigger, RunDefaults, RunsOn, Step, Strategy, Workflow,
    WorkflowDispatchTrigger, WorkflowTriggers,
};
pub(crate) use schema::scalar_to_string;

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading or writing workflow files.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    /// The file could not be read or written
    #[error("failed to access workflow {path}: {source}")]
    #[diagnostic(code(stepwise::workflow::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid YAML or schema mismatch
    #[error("invalid workflow: {message}")]
    #[diagnostic(code(stepwise::workflow::parse))]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: Option<SourceSpan>,
    },

    /// The workflow could not be serialized
    #[error("failed to serialize workflow: {0}")]
    #[diagnostic(code(stepwise::workflow::serialize))]
    Serialize(#[source] serde_yaml::Error),
}

impl Workflow {
    /// Load a workflow file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, &path.display().to_string())
    }

    /// Parse workflow YAML; `name` labels diagnostics.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic pointing at the offending location.
    pub fn from_yaml_str(content: &str, name: &str) -> Result<Self, WorkflowError> {
        let workflow: Self = serde_yaml::from_str(content).map_err(|e| {
            let span = e
                .location()
                .map(|loc| SourceSpan::from((loc.index().min(content.len()), 1)));
            WorkflowError::Parse {
                message: e.to_string(),
                src: NamedSource::new(name, content.to_string()),
                span,
            }
        })?;

        if workflow.jobs.is_empty() {
            return Err(WorkflowError::Parse {
                message: "workflow defines no jobs".to_string(),
                src: NamedSource::new(name, content.to_string()),
                span: None,
            });
        }
        Ok(workflow)
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, WorkflowError> {
        serde_yaml::to_string(self).map_err(WorkflowError::Serialize)
    }

    /// Display name, `workflow` when unnamed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }
}
