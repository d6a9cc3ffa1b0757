//! Shells for `run` steps.
//!
//! | shell | invocation |
//! |-------|------------|
//! | `bash` | `bash --noprofile --norc -eo pipefail -c <script>` |
//! | `sh` | `sh -e -c <script>` |
//! | `python` | `python -c <script>` |
//! | custom | template containing `{0}`, replaced by a script file path |
//!
//! Without an explicit shell, bash is used when it is on `PATH` and `sh`
//! otherwise.

use super::runner::RunnerError;
use std::path::{Path, PathBuf};

/// A resolved shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shell {
    /// GNU bash with `pipefail`
    Bash,
    /// POSIX sh
    Sh,
    /// The `python` on the step's `PATH`
    Python,
    /// Custom command template with a `{0}` placeholder
    Custom(String),
}

impl Shell {
    /// Resolve a `shell:` value; `None` picks the default.
    ///
    /// # Errors
    /// Returns error for an unknown shell name without a `{0}` placeholder
    pub fn resolve(name: Option<&str>, search_path: Option<&str>) -> Result<Self, RunnerError> {
        match name.map(str::trim) {
            None | Some("") => Ok(Self::default_for(search_path)),
            Some("bash") => Ok(Self::Bash),
            Some("sh") => Ok(Self::Sh),
            Some("python") => Ok(Self::Python),
            Some(template) if template.contains("{0}") => Ok(Self::Custom(template.to_string())),
            Some(other) => Err(RunnerError::UnsupportedShell {
                shell: other.to_string(),
            }),
        }
    }

    fn default_for(search_path: Option<&str>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        if which::which_in("bash", search_path, cwd).is_ok() {
            Self::Bash
        } else {
            tracing::debug!("bash not found on PATH, falling back to sh");
            Self::Sh
        }
    }

    /// Program and arguments running `script`. Custom shells get the script
    /// written to `script_dir`.
    ///
    /// # Errors
    /// Returns error if the script file cannot be written or the template is
    /// empty
    pub fn command(
        &self,
        script: &str,
        script_dir: &Path,
        step_index: usize,
    ) -> Result<(String, Vec<String>), RunnerError> {
        let owned = |args: &[&str]| args.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        match self {
            Self::Bash => Ok((
                "bash".to_string(),
                owned(&["--noprofile", "--norc", "-eo", "pipefail", "-c", script]),
            )),
            Self::Sh => Ok(("sh".to_string(), owned(&["-e", "-c", script]))),
            Self::Python => Ok(("python".to_string(), owned(&["-c", script]))),
            Self::Custom(template) => {
                let path = script_dir.join(format!("step_{step_index}_script"));
                std::fs::create_dir_all(script_dir)
                    .and_then(|()| std::fs::write(&path, script))
                    .map_err(|source| RunnerError::ScriptFile {
                        path: path.clone(),
                        source,
                    })?;
                let path = path.display().to_string();
                let mut parts = template
                    .split_whitespace()
                    .map(|part| part.replace("{0}", &path));
                let program = parts.next().ok_or_else(|| RunnerError::UnsupportedShell {
                    shell: template.clone(),
                })?;
                Ok((program, parts.collect()))
            }
        }
    }

    /// Name as written in workflows.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Bash => "bash",
            Self::Sh => "sh",
            Self::Python => "python",
            Self::Custom(template) => template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_shells() {
        assert_eq!(Shell::resolve(Some("bash"), None).unwrap(), Shell::Bash);
        assert_eq!(Shell::resolve(Some("sh"), None).unwrap(), Shell::Sh);
        assert_eq!(Shell::resolve(Some("python"), None).unwrap(), Shell::Python);
        assert!(matches!(
            Shell::resolve(Some("fish"), None),
            Err(RunnerError::UnsupportedShell { .. })
        ));
    }

    #[test]
    fn test_default_falls_back_to_sh_without_bash() {
        let empty = tempfile::TempDir::new().unwrap();
        let path = empty.path().display().to_string();
        assert_eq!(Shell::resolve(None, Some(&path)).unwrap(), Shell::Sh);
    }

    #[test]
    fn test_bash_invocation() {
        let (program, args) = Shell::Bash.command("echo hi", Path::new("/tmp"), 0).unwrap();
        assert_eq!(program, "bash");
        assert_eq!(args, vec!["--noprofile", "--norc", "-eo", "pipefail", "-c", "echo hi"]);
    }

    #[test]
    fn test_custom_template_writes_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let shell = Shell::resolve(Some("perl -w {0}"), None).unwrap();
        let (program, args) = shell.command("print 1;", dir.path(), 2).unwrap();
        assert_eq!(program, "perl");
        assert_eq!(args[0], "-w");
        assert_eq!(std::fs::read_to_string(&args[1]).unwrap(), "print 1;");
    }
}
