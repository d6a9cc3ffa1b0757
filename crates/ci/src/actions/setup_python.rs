//! `actions/setup-python`
//!
//! Finds an interpreter on `PATH` whose version starts with `python-version`
//! and provisions a virtual environment for it under
//! `<toolcache>/python/<version>`. The environment's `bin` directory goes to
//! the front of `PATH`, so `python -m pip install` in later steps installs
//! into it, and `pythonLocation` points at it for the cache step.

use super::{ActionContext, ActionError, ActionOutcome, input};
use std::path::{Path, PathBuf};
use tokio::process::Command;

const ACTION: &str = "actions/setup-python";

const VERSION_PROBE: &str = "import sys; print('.'.join(map(str, sys.version_info[:3])))";

#[cfg(windows)]
const VENV_BIN: &str = "Scripts";
#[cfg(not(windows))]
const VENV_BIN: &str = "bin";

#[cfg(windows)]
const PYTHON_EXE: &str = "python.exe";
#[cfg(not(windows))]
const PYTHON_EXE: &str = "python";

/// An interpreter found on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    /// Executable path
    pub path: PathBuf,
    /// Full `major.minor.patch` version
    pub version: String,
}

pub(super) async fn run(
    inputs: &indexmap::IndexMap<String, String>,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let requested = input(inputs, "python-version");
    let interpreter = find_interpreter(requested, ctx).await?;
    tracing::info!(
        requested = requested.unwrap_or("any"),
        version = %interpreter.version,
        path = %interpreter.path.display(),
        "Found Python interpreter"
    );

    let location = ctx.toolcache.join("python").join(&interpreter.version);
    let python = ensure_venv(&interpreter, &location).await?;
    let location_str = location.display().to_string();

    let mut outcome = ActionOutcome::default()
        .with_output("python-version", interpreter.version.clone())
        .with_output("python-path", python.display().to_string());
    for key in ["pythonLocation", "Python_ROOT_DIR", "Python3_ROOT_DIR"] {
        outcome.env.insert(key.to_string(), location_str.clone());
    }
    outcome.path.push(location.join(VENV_BIN));
    Ok(outcome)
}

/// Whether `actual` (`3.9.18`) satisfies `requested` (`3.9`, `3.9.18`, `3.x`).
#[must_use]
pub fn version_matches(requested: &str, actual: &str) -> bool {
    let requested: Vec<&str> = requested.trim().split('.').collect();
    let actual: Vec<&str> = actual.trim().split('.').collect();
    requested.len() <= actual.len()
        && requested
            .iter()
            .zip(&actual)
            .all(|(want, have)| *want == "x" || *want == "*" || want == have)
}

fn candidates(requested: Option<&str>) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(version) = requested {
        let major_minor: Vec<&str> = version.split('.').take(2).collect();
        if major_minor.iter().all(|part| part.chars().all(|c| c.is_ascii_digit())) {
            names.push(format!("python{}", major_minor.join(".")));
        }
    }
    names.push("python3".to_string());
    names.push("python".to_string());
    names
}

async fn probe_version(path: &Path) -> Option<String> {
    let output = Command::new(path)
        .args(["-c", VERSION_PROBE])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

/// Search `PATH` for an interpreter matching `requested`.
///
/// # Errors
///
/// Returns an environment-setup error when no candidate matches.
pub async fn find_interpreter(
    requested: Option<&str>,
    ctx: &ActionContext<'_>,
) -> Result<Interpreter, ActionError> {
    let search_path = ctx.search_path();
    let mut seen = Vec::new();

    for name in candidates(requested) {
        let Ok(path) = which::which_in(&name, search_path.as_deref(), ctx.workspace) else {
            continue;
        };
        let Some(version) = probe_version(&path).await else {
            tracing::debug!(path = %path.display(), "Interpreter did not report a version");
            continue;
        };
        if requested.is_none_or(|want| version_matches(want, &version)) {
            return Ok(Interpreter { path, version });
        }
        seen.push(format!("{} ({version})", path.display()));
    }

    let wanted = requested.unwrap_or("any version");
    let message = if seen.is_empty() {
        format!("{ACTION}: Python {wanted} was not found on PATH")
    } else {
        format!(
            "{ACTION}: Python {wanted} was not found on PATH; found {}",
            seen.join(", ")
        )
    };
    Err(ActionError::environment_setup(
        message,
        Some("install the requested interpreter or change `python-version`"),
    ))
}

/// Create (or reuse) the virtual environment at `location`; returns its
/// interpreter.
async fn ensure_venv(interpreter: &Interpreter, location: &Path) -> Result<PathBuf, ActionError> {
    let python = location.join(VENV_BIN).join(PYTHON_EXE);
    if python.exists() {
        tracing::debug!(location = %location.display(), "Reusing virtual environment");
        return Ok(python);
    }

    if let Some(parent) = location.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ActionError::environment_setup(
                format!("{ACTION}: cannot create {}: {e}", parent.display()),
                Some("set STEPWISE_TOOLCACHE_DIR to a writable directory"),
            )
        })?;
    }

    tracing::info!(location = %location.display(), "Creating virtual environment");
    let output = Command::new(&interpreter.path)
        .arg("-m")
        .arg("venv")
        .arg(location)
        .output()
        .await
        .map_err(|e| {
            ActionError::environment_setup(
                format!("{ACTION}: failed to run {}: {e}", interpreter.path.display()),
                None,
            )
        })?;
    if !output.status.success() || !python.exists() {
        let _ = tokio::fs::remove_dir_all(location).await;
        return Err(ActionError::environment_setup(
            format!(
                "{ACTION}: creating a virtual environment with Python {} failed: {}",
                interpreter.version,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Some("the `venv` module is required (Debian/Ubuntu: apt install python3-venv)"),
        ));
    }
    Ok(python)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use stepwise_core::config::CachePolicy;

    #[test]
    fn test_version_matches() {
        assert!(version_matches("3.9", "3.9.18"));
        assert!(version_matches("3.9.18", "3.9.18"));
        assert!(version_matches("3", "3.12.1"));
        assert!(version_matches("3.x", "3.11.0"));
        assert!(!version_matches("3.9", "3.10.2"));
        assert!(!version_matches("3.1", "3.10.2"));
        assert!(!version_matches("3.9.18.1", "3.9.18"));
    }

    #[test]
    fn test_candidates() {
        assert_eq!(candidates(Some("3.9")), vec!["python3.9", "python3", "python"]);
        assert_eq!(candidates(Some("3.x")), vec!["python3", "python"]);
        assert_eq!(candidates(None), vec!["python3", "python"]);
    }

    #[cfg(unix)]
    mod fake_interpreter {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        // Answers the version probe and fakes `-m venv DIR`.
        const FAKE_PYTHON: &str = r#"#!/bin/sh
if [ "$1" = "-c" ]; then echo "3.9.18"; exit 0; fi
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
  mkdir -p "$3/bin" && cp "$0" "$3/bin/python"
  exit 0
fi
exit 1
"#;

        fn install_fake(dir: &Path) {
            let path = dir.join("python3");
            std::fs::write(&path, FAKE_PYTHON).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn env_with_path(bin: &Path) -> IndexMap<String, String> {
            let mut env = IndexMap::new();
            env.insert("PATH".to_string(), bin.display().to_string());
            env
        }

        #[tokio::test]
        async fn test_provisions_venv_and_exports_location() {
            let tmp = TempDir::new().unwrap();
            let bin = tmp.path().join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            install_fake(&bin);
            let toolcache = tmp.path().join("toolcache");
            let env = env_with_path(&bin);
            let ctx = ActionContext {
                workspace: tmp.path(),
                toolcache: &toolcache,
                env: &env,
                cache: None,
                cache_policy: CachePolicy::Disabled,
            };

            let mut inputs = IndexMap::new();
            inputs.insert("python-version".to_string(), "3.9".to_string());
            let outcome = run(&inputs, &ctx).await.unwrap();

            let location = toolcache.join("python/3.9.18");
            assert_eq!(outcome.outputs["python-version"], "3.9.18");
            assert_eq!(
                outcome.env["pythonLocation"],
                location.display().to_string()
            );
            assert_eq!(outcome.path, vec![location.join("bin")]);
            assert!(location.join("bin/python").exists());

            // Second run reuses the environment
            let again = run(&inputs, &ctx).await.unwrap();
            assert_eq!(again.env, outcome.env);
        }

        #[tokio::test]
        async fn test_version_mismatch_is_environment_error() {
            let tmp = TempDir::new().unwrap();
            install_fake(tmp.path());
            let env = env_with_path(tmp.path());
            let ctx = ActionContext {
                workspace: tmp.path(),
                toolcache: tmp.path(),
                env: &env,
                cache: None,
                cache_policy: CachePolicy::Disabled,
            };
            let err = find_interpreter(Some("3.12"), &ctx).await.unwrap_err();
            match err {
                ActionError::EnvironmentSetup { message, help } => {
                    assert!(message.contains("3.12"));
                    assert!(message.contains("3.9.18"));
                    assert!(help.is_some());
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
