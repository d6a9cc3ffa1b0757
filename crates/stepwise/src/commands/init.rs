//! `stepwise init`

use super::{Outcome, resolve_workspace};
use crate::cli::{CliError, InitArgs, OkEnvelope};
use serde_json::json;
use stepwise_ci::presets::{PythonPackagePreset, python_package};

/// Write the Python package workflow into the workspace.
///
/// # Errors
///
/// Returns a configuration error if the file exists and `--force` was not
/// given, or an I/O error if it cannot be written.
pub fn execute(args: &InitArgs, json_mode: bool) -> Result<Outcome, CliError> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    let path = workspace.join(&args.output);
    if path.exists() && !args.force {
        return Err(CliError::config_with_help(
            format!("{} already exists", path.display()),
            "Pass --force to overwrite it",
        ));
    }

    let preset = PythonPackagePreset {
        package: args.package.clone(),
        branch: args.branch.clone(),
        python_versions: args.python.clone(),
        os: args.os.clone(),
    };
    let yaml = python_package(&preset).to_yaml()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| stepwise_core::Error::io(e, parent, "create_dir"))?;
    }
    std::fs::write(&path, yaml).map_err(|e| stepwise_core::Error::io(e, &path, "write"))?;
    tracing::info!(path = %path.display(), package = %preset.package, "Wrote workflow");

    if json_mode {
        let text = serde_json::to_string(&OkEnvelope::new(json!({ "path": path })))
            .map_err(|e| CliError::other(format!("Failed to serialize result: {e}")))?;
        return Ok(Outcome::output(text));
    }
    Ok(Outcome::output(format!("Wrote {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use stepwise_ci::Workflow;
    use tempfile::TempDir;

    fn args(workspace: &TempDir) -> InitArgs {
        InitArgs {
            package: "mypkg".to_string(),
            branch: "main".to_string(),
            python: vec!["3.9".to_string()],
            os: "ubuntu-latest".to_string(),
            output: PathBuf::from(super::super::DEFAULT_WORKFLOW),
            force: false,
            workspace: Some(workspace.path().to_path_buf()),
        }
    }

    #[test]
    fn test_writes_loadable_workflow() {
        let dir = TempDir::new().unwrap();
        execute(&args(&dir), false).unwrap();

        let path = dir.path().join(super::super::DEFAULT_WORKFLOW);
        let workflow = Workflow::from_path(&path).unwrap();
        assert_eq!(workflow.jobs["build"].steps.len(), 11);
        assert!(std::fs::read_to_string(path).unwrap().contains("black --check mypkg"));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        execute(&args(&dir), false).unwrap();
        let err = execute(&args(&dir), false).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));

        let forced = InitArgs {
            force: true,
            ..args(&dir)
        };
        assert!(execute(&forced, false).is_ok());
    }
}
