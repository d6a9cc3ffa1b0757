use super::{CIContext, CIProvider};
use crate::context::{EventKind, TriggerEvent};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Running inside GitHub Actions.
pub struct GitHubProvider {
    context: CIContext,
    summary_path: Option<PathBuf>,
}

impl GitHubProvider {
    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

impl CIProvider for GitHubProvider {
    fn detect(_workspace: &Path) -> Option<Self> {
        if std::env::var("GITHUB_ACTIONS").ok()? != "true" {
            return None;
        }

        let event = Self::var("GITHUB_EVENT_NAME").unwrap_or_else(|| "push".to_string());
        let kind = event.parse::<EventKind>().unwrap_or_else(|_| {
            debug!(event = %event, "Unsupported GitHub event, treating as manual");
            EventKind::Manual
        });
        let ref_name = Self::var("GITHUB_REF_NAME").unwrap_or_default();
        let base_ref = Self::var("GITHUB_BASE_REF");
        let head_ref = Self::var("GITHUB_HEAD_REF");

        // Pull request filters match the target branch.
        let branch = match kind {
            EventKind::PullRequest => base_ref.clone().unwrap_or_else(|| ref_name.clone()),
            EventKind::Push | EventKind::Manual => ref_name,
        };

        Some(Self {
            context: CIContext {
                provider: "github".to_string(),
                trigger: TriggerEvent::new(kind, branch),
                head_ref,
                base_ref,
                sha: Self::var("GITHUB_SHA").unwrap_or_default(),
                repository: Self::var("GITHUB_REPOSITORY"),
            },
            summary_path: Self::var("GITHUB_STEP_SUMMARY").map(PathBuf::from),
        })
    }

    fn context(&self) -> &CIContext {
        &self.context
    }

    fn summary_path(&self) -> Option<PathBuf> {
        self.summary_path.clone()
    }
}
