//! `actions/checkout`: runs operate on the existing checkout, so the action
//! only verifies the workspace and reports its commit.

use super::{ActionContext, ActionError, ActionOutcome};
use tokio::process::Command;

pub(super) async fn run(ctx: &ActionContext<'_>) -> Result<ActionOutcome, ActionError> {
    if !ctx.workspace.is_dir() {
        return Err(ActionError::environment_setup(
            format!("workspace {} does not exist", ctx.workspace.display()),
            Some("pass --workspace pointing at the repository checkout"),
        ));
    }

    let mut outcome = ActionOutcome::default();
    let head = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(ctx.workspace)
        .output()
        .await;
    match head {
        Ok(output) if output.status.success() => {
            let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
            tracing::debug!(commit = %commit, "Using existing checkout");
            outcome = outcome.with_output("commit", commit);
        }
        _ => tracing::debug!(
            workspace = %ctx.workspace.display(),
            "Workspace is not a git work tree"
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::path::Path;
    use stepwise_core::config::CachePolicy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_plain_directory_has_no_commit() {
        let tmp = TempDir::new().unwrap();
        let env = IndexMap::new();
        let ctx = ActionContext {
            workspace: tmp.path(),
            toolcache: tmp.path(),
            env: &env,
            cache: None,
            cache_policy: CachePolicy::Disabled,
        };
        let outcome = run(&ctx).await.unwrap();
        assert!(outcome.outputs.get("commit").is_none());
    }

    #[tokio::test]
    async fn test_missing_workspace_fails() {
        let env = IndexMap::new();
        let ctx = ActionContext {
            workspace: Path::new("/definitely/not/here"),
            toolcache: Path::new("/tmp"),
            env: &env,
            cache: None,
            cache_policy: CachePolicy::Disabled,
        };
        assert!(matches!(
            run(&ctx).await,
            Err(ActionError::EnvironmentSetup { .. })
        ));
    }
}
