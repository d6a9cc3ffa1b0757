//! Command implementations.
//!
//! Every command returns an [`Outcome`]: text for stdout plus an optional
//! failure that `main` renders after the event renderer has drained.

pub mod cache;
pub mod init;
pub mod plan;
pub mod run;

use crate::cli::{CliError, Commands, SelectArgs};
use std::path::{Path, PathBuf};
use stepwise_core::config::Config;
use stepwise_core::paths;
use tokio_util::sync::CancellationToken;

/// Workflow run when neither `--workflow` nor `stepwise.toml` names one.
pub const DEFAULT_WORKFLOW: &str = ".github/workflows/python-package.yml";

/// What a command produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Text for stdout
    pub output: Option<String>,
    /// Set when the command ran but did not succeed
    pub failure: Option<CliError>,
}

impl Outcome {
    /// Output with no failure.
    #[must_use]
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            failure: None,
        }
    }
}

/// Dispatch a parsed command.
///
/// # Errors
///
/// Returns a [`CliError`] when the command cannot start or aborts.
pub async fn execute(
    command: Commands,
    json: bool,
    cancel: CancellationToken,
) -> Result<Outcome, CliError> {
    match command {
        Commands::Run(args) => run::execute(&args, json, cancel).await,
        Commands::Plan(args) => plan::execute(&args, json),
        Commands::Init(args) => init::execute(&args, json),
        Commands::Cache { subcommand } => cache::execute(subcommand, json).await,
    }
}

/// Workspace from `--workspace`, or the current directory.
pub(crate) fn resolve_workspace(flag: Option<&Path>) -> Result<PathBuf, CliError> {
    let workspace = match flag {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().map_err(|e| {
            CliError::other_with_help(
                format!("Cannot determine current directory: {e}"),
                "Pass --workspace explicitly",
            )
        })?,
    };
    if !workspace.is_dir() {
        return Err(CliError::config_with_help(
            format!("Workspace {} is not a directory", workspace.display()),
            "Pass --workspace pointing at the repository checkout",
        ));
    }
    Ok(workspace)
}

/// Workflow path: `--workflow`, then `[run] workflow`, then the default.
pub(crate) fn workflow_path(select: &SelectArgs, config: &Config, workspace: &Path) -> PathBuf {
    let relative = select
        .workflow
        .clone()
        .or_else(|| config.workflow().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOW));
    workspace.join(relative)
}

/// Resolved data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DataDirs {
    /// Dependency cache root
    pub deps: PathBuf,
    /// Tool cache root
    pub toolcache: PathBuf,
}

/// Resolve the cache base: `--cache-dir` (or `STEPWISE_CACHE_DIR`), then
/// `[cache] dir`, then the platform cache directory.
///
/// The tool cache follows the same base unless `[toolcache] dir` or
/// `STEPWISE_TOOLCACHE_DIR` place it elsewhere.
pub(crate) fn data_dirs(flag: Option<&Path>, config: &Config) -> Result<DataDirs, CliError> {
    let explicit = flag
        .map(Path::to_path_buf)
        .or_else(|| config.cache_dir().map(expand));
    let base = match &explicit {
        Some(base) => base.clone(),
        None => paths::cache_dir()?,
    };

    let toolcache = if let Some(dir) = config.toolcache_dir() {
        expand(dir)
    } else if explicit.is_some() && std::env::var_os("STEPWISE_TOOLCACHE_DIR").is_none() {
        base.join("toolcache")
    } else {
        paths::toolcache_dir()?
    };

    Ok(DataDirs {
        deps: base.join("deps"),
        toolcache,
    })
}

fn expand(path: &Path) -> PathBuf {
    path.to_str().map_or_else(|| path.to_path_buf(), paths::expand_home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_path_precedence() {
        let workspace = Path::new("/repo");
        let config =
            Config::from_toml_str("[run]\nworkflow = \"ci/main.yml\"\n", Path::new("stepwise.toml"))
                .unwrap();

        let select = SelectArgs::default();
        assert_eq!(
            workflow_path(&select, &Config::default(), workspace),
            workspace.join(DEFAULT_WORKFLOW)
        );
        assert_eq!(
            workflow_path(&select, &config, workspace),
            PathBuf::from("/repo/ci/main.yml")
        );

        let select = SelectArgs {
            workflow: Some(PathBuf::from("other.yml")),
            ..SelectArgs::default()
        };
        assert_eq!(
            workflow_path(&select, &config, workspace),
            PathBuf::from("/repo/other.yml")
        );
    }

    #[test]
    fn test_data_dirs_from_flag() {
        temp_env::with_var_unset("STEPWISE_TOOLCACHE_DIR", || {
            let dirs = data_dirs(Some(Path::new("/data")), &Config::default()).unwrap();
            assert_eq!(dirs.deps, PathBuf::from("/data/deps"));
            assert_eq!(dirs.toolcache, PathBuf::from("/data/toolcache"));
        });
    }

    #[test]
    fn test_data_dirs_from_config() {
        let config = Config::from_toml_str(
            "[cache]\ndir = \"/var/cache/ci\"\n\n[toolcache]\ndir = \"/opt/tools\"\n",
            Path::new("stepwise.toml"),
        )
        .unwrap();
        let dirs = data_dirs(None, &config).unwrap();
        assert_eq!(dirs.deps, PathBuf::from("/var/cache/ci/deps"));
        assert_eq!(dirs.toolcache, PathBuf::from("/opt/tools"));
    }

    #[test]
    fn test_missing_workspace_is_config_error() {
        let err = resolve_workspace(Some(Path::new("/definitely/not/here"))).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }
}
