//! CI environment detection.

use crate::context::CIContext;
use std::path::{Path, PathBuf};

/// A CI host the runner can detect.
pub trait CIProvider: Send + Sync {
    /// Detect if running in this CI environment
    fn detect(workspace: &Path) -> Option<Self>
    where
        Self: Sized;

    /// Get normalized CI context
    fn context(&self) -> &CIContext;

    /// File that receives the markdown job summary, if the host has one
    fn summary_path(&self) -> Option<PathBuf> {
        None
    }
}

pub mod github;
pub mod local;

/// Detect the environment: GitHub Actions first, the local checkout otherwise.
#[must_use]
pub fn detect(workspace: &Path) -> Box<dyn CIProvider> {
    if let Some(provider) = github::GitHubProvider::detect(workspace) {
        tracing::debug!(context = %provider.context(), "Detected GitHub Actions");
        return Box::new(provider);
    }
    let provider = local::LocalProvider::for_workspace(workspace);
    tracing::debug!(context = %provider.context(), "Using local context");
    Box::new(provider)
}
