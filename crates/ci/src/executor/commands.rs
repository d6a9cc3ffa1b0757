//! Step file commands.
//!
//! Each step gets fresh `GITHUB_ENV`, `GITHUB_OUTPUT` and `GITHUB_PATH`
//! files. After the step they are parsed: `GITHUB_ENV` and `GITHUB_OUTPUT`
//! hold `KEY=VALUE` lines or heredocs
//!
//! ```text
//! CHANGELOG<<EOF
//! line one
//! line two
//! EOF
//! ```
//!
//! and `GITHUB_PATH` holds one directory per line.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Malformed file command content.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileCommandError {
    /// A line is neither `KEY=VALUE` nor `KEY<<DELIMITER`
    #[error("{file}: invalid format '{line}'")]
    InvalidLine { file: &'static str, line: String },

    /// A heredoc is never closed
    #[error("{file}: matching delimiter not found '{delimiter}'")]
    UnterminatedHeredoc {
        file: &'static str,
        delimiter: String,
    },

    /// A key is empty
    #[error("{file}: empty key in '{line}'")]
    EmptyKey { file: &'static str, line: String },

    /// The file could not be created or read
    #[error("{file}: {message}")]
    Io { file: &'static str, message: String },
}

/// What a step wrote to its command files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCommandOutput {
    /// Environment for later steps
    pub env: IndexMap<String, String>,
    /// `steps.<id>.outputs`
    pub outputs: IndexMap<String, String>,
    /// Directories prepended to `PATH`, in order
    pub path: Vec<PathBuf>,
}

/// The three command files of one step.
#[derive(Debug, Clone)]
pub struct FileCommands {
    env_file: PathBuf,
    output_file: PathBuf,
    path_file: PathBuf,
}

impl FileCommands {
    /// Create empty command files for step `index` under `dir`.
    ///
    /// # Errors
    /// Returns error if the files cannot be created
    pub fn create(dir: &Path, index: usize) -> Result<Self, FileCommandError> {
        std::fs::create_dir_all(dir).map_err(|e| FileCommandError::Io {
            file: "file commands",
            message: e.to_string(),
        })?;
        let commands = Self {
            env_file: dir.join(format!("set_env_{index}")),
            output_file: dir.join(format!("set_output_{index}")),
            path_file: dir.join(format!("add_path_{index}")),
        };
        for (file, path) in commands.files() {
            std::fs::write(path, "").map_err(|e| FileCommandError::Io {
                file,
                message: e.to_string(),
            })?;
        }
        Ok(commands)
    }

    fn files(&self) -> [(&'static str, &Path); 3] {
        [
            ("GITHUB_ENV", self.env_file.as_path()),
            ("GITHUB_OUTPUT", self.output_file.as_path()),
            ("GITHUB_PATH", self.path_file.as_path()),
        ]
    }

    /// Environment variables pointing the step at the files.
    #[must_use]
    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.files()
            .iter()
            .map(|(name, path)| ((*name).to_string(), path.display().to_string()))
            .collect()
    }

    /// Parse what the step wrote.
    ///
    /// # Errors
    /// Returns error if a file is unreadable or malformed
    pub fn collect(&self) -> Result<FileCommandOutput, FileCommandError> {
        let read = |file: &'static str, path: &Path| {
            std::fs::read_to_string(path).map_err(|e| FileCommandError::Io {
                file,
                message: e.to_string(),
            })
        };
        Ok(FileCommandOutput {
            env: parse_key_values("GITHUB_ENV", &read("GITHUB_ENV", &self.env_file)?)?,
            outputs: parse_key_values("GITHUB_OUTPUT", &read("GITHUB_OUTPUT", &self.output_file)?)?,
            path: parse_paths(&read("GITHUB_PATH", &self.path_file)?),
        })
    }
}

/// Parse `KEY=VALUE` lines and `KEY<<DELIMITER` heredocs.
///
/// # Errors
/// Returns error for malformed lines and unterminated heredocs
pub fn parse_key_values(
    file: &'static str,
    content: &str,
) -> Result<IndexMap<String, String>, FileCommandError> {
    let mut values = IndexMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }
        let eq = line.find('=');
        let heredoc = line.find("<<");

        let (key, value) = match (eq, heredoc) {
            (Some(eq), h) if h.is_none_or(|h| eq < h) => {
                (&line[..eq], line[eq + 1..].to_string())
            }
            (_, Some(h)) => {
                let delimiter = &line[h + 2..];
                if delimiter.is_empty() {
                    return Err(FileCommandError::InvalidLine {
                        file,
                        line: line.to_string(),
                    });
                }
                let mut body = Vec::new();
                let mut closed = false;
                for next in lines.by_ref() {
                    if next == delimiter {
                        closed = true;
                        break;
                    }
                    body.push(next);
                }
                if !closed {
                    return Err(FileCommandError::UnterminatedHeredoc {
                        file,
                        delimiter: delimiter.to_string(),
                    });
                }
                (&line[..h], body.join("\n"))
            }
            _ => {
                return Err(FileCommandError::InvalidLine {
                    file,
                    line: line.to_string(),
                });
            }
        };

        if key.is_empty() {
            return Err(FileCommandError::EmptyKey {
                file,
                line: line.to_string(),
            });
        }
        values.insert(key.to_string(), value);
    }
    Ok(values)
}

/// One directory per non-empty line.
#[must_use]
pub fn parse_paths(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_lines() {
        let values = parse_key_values("GITHUB_ENV", "A=1\nB=x=y\n\nC=\n").unwrap();
        assert_eq!(values["A"], "1");
        assert_eq!(values["B"], "x=y");
        assert_eq!(values["C"], "");
    }

    #[test]
    fn test_heredoc() {
        let content = "NOTES<<EOF\nline one\nline two\nEOF\nAFTER=1\n";
        let values = parse_key_values("GITHUB_OUTPUT", content).unwrap();
        assert_eq!(values["NOTES"], "line one\nline two");
        assert_eq!(values["AFTER"], "1");
    }

    #[test]
    fn test_equals_before_heredoc_marker_is_plain_value() {
        let values = parse_key_values("GITHUB_ENV", "CMD=a<<b\n").unwrap();
        assert_eq!(values["CMD"], "a<<b");
    }

    #[test]
    fn test_later_value_wins() {
        let values = parse_key_values("GITHUB_ENV", "A=1\nA=2\n").unwrap();
        assert_eq!(values["A"], "2");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_key_values("GITHUB_ENV", "garbage\n"),
            Err(FileCommandError::InvalidLine { .. })
        ));
        assert!(matches!(
            parse_key_values("GITHUB_ENV", "X<<EOF\nbody\n"),
            Err(FileCommandError::UnterminatedHeredoc { .. })
        ));
        assert!(matches!(
            parse_key_values("GITHUB_ENV", "=value\n"),
            Err(FileCommandError::EmptyKey { .. })
        ));
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            parse_paths("/opt/a/bin\n\n  /opt/b/bin \n"),
            vec![PathBuf::from("/opt/a/bin"), PathBuf::from("/opt/b/bin")]
        );
    }

    #[test]
    fn test_create_and_collect() {
        let dir = tempfile::TempDir::new().unwrap();
        let commands = FileCommands::create(dir.path(), 3).unwrap();
        let vars = commands.env_vars();
        assert_eq!(vars[0].0, "GITHUB_ENV");

        std::fs::write(&vars[0].1, "pythonLocation=/opt/py\n").unwrap();
        std::fs::write(&vars[1].1, "cache-hit=true\n").unwrap();
        std::fs::write(&vars[2].1, "/opt/py/bin\n").unwrap();

        let output = commands.collect().unwrap();
        assert_eq!(output.env["pythonLocation"], "/opt/py");
        assert_eq!(output.outputs["cache-hit"], "true");
        assert_eq!(output.path, vec![PathBuf::from("/opt/py/bin")]);
    }
}
