use super::{CIContext, CIProvider};
use crate::context::{EventKind, TriggerEvent};
use std::path::Path;
use std::process::Command;

/// A developer checkout: the trigger is a push of the current branch.
pub struct LocalProvider {
    context: CIContext,
}

impl LocalProvider {
    /// Build the context from the git checkout at `workspace`.
    ///
    /// Outside a git work tree the branch defaults to `main` and the SHA is
    /// left empty.
    #[must_use]
    pub fn for_workspace(workspace: &Path) -> Self {
        let branch = git(workspace, &["rev-parse", "--abbrev-ref", "HEAD"])
            .filter(|branch| branch != "HEAD")
            .unwrap_or_else(|| "main".to_string());
        let sha = git(workspace, &["rev-parse", "HEAD"]).unwrap_or_default();

        Self {
            context: CIContext {
                provider: "local".to_string(),
                trigger: TriggerEvent::new(EventKind::Push, branch),
                head_ref: None,
                base_ref: None,
                sha,
                repository: None,
            },
        }
    }
}

fn git(workspace: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

impl CIProvider for LocalProvider {
    fn detect(workspace: &Path) -> Option<Self> {
        // Always available as fallback
        Some(Self::for_workspace(workspace))
    }

    fn context(&self) -> &CIContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_outside_git_defaults() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::for_workspace(dir.path());
        let ctx = provider.context();
        assert_eq!(ctx.provider, "local");
        assert_eq!(ctx.trigger.kind, EventKind::Push);
        assert!(provider.summary_path().is_none());
    }
}
