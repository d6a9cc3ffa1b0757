//! `hashFiles` implementation.
//!
//! Files under the workspace are matched against the patterns in order; a
//! pattern prefixed with `!` removes files matched by earlier patterns. The
//! result is the SHA-256 of the concatenated per-file SHA-256 digests, taken in
//! sorted path order, or the empty string when nothing matched.

use glob::{MatchOptions, Pattern};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors from [`hash_files`].
#[derive(Debug, Error)]
pub enum HashError {
    /// A pattern is not a valid glob
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Walking the workspace failed
    #[error("failed to walk workspace: {0}")]
    Walk(#[from] walkdir::Error),

    /// A matched file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Hash the files under `workspace` matching `patterns`.
///
/// # Errors
///
/// Returns an error for invalid patterns or unreadable files.
pub fn hash_files(workspace: &Path, patterns: &[String]) -> Result<String, HashError> {
    let files = matching_files(workspace, patterns)?;
    if files.is_empty() {
        tracing::debug!(?patterns, "hashFiles matched no files");
        return Ok(String::new());
    }

    let mut outer = Sha256::new();
    for file in &files {
        outer.update(hash_file(file)?);
    }
    tracing::debug!(count = files.len(), ?patterns, "hashFiles matched files");
    Ok(hex::encode(outer.finalize()))
}

/// Files under `workspace` matching `patterns`, sorted by relative path.
///
/// # Errors
///
/// Returns an error for invalid patterns or when the walk fails.
pub fn matching_files(workspace: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, HashError> {
    let compiled = patterns
        .iter()
        .map(|raw| {
            let (negated, pattern) = match raw.trim().strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.trim()),
            };
            let pattern = pattern.trim_start_matches("./");
            Pattern::new(pattern)
                .map(|p| (negated, p))
                .map_err(|source| HashError::Pattern {
                    pattern: raw.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if !workspace.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(workspace)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(workspace) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");

        let mut included = false;
        for (negated, pattern) in &compiled {
            if pattern.matches_with(&relative, MATCH_OPTIONS) {
                included = !negated;
            }
        }
        if included {
            files.push((relative, entry.into_path()));
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn hash_file(path: &Path) -> Result<Vec<u8>, HashError> {
    let read_error = |source| HashError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer).map_err(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "numpy\nscipy\n").unwrap();
        std::fs::create_dir_all(dir.path().join("bcdi/utils")).unwrap();
        std::fs::write(dir.path().join("bcdi/__init__.py"), "").unwrap();
        std::fs::write(dir.path().join("bcdi/utils/io.py"), "x = 1\n").unwrap();
        dir
    }

    fn p(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let dir = workspace();
        let first = hash_files(dir.path(), &p(&["requirements.txt"])).unwrap();
        let second = hash_files(dir.path(), &p(&["requirements.txt"])).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        std::fs::write(dir.path().join("requirements.txt"), "numpy\n").unwrap();
        let third = hash_files(dir.path(), &p(&["requirements.txt"])).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_no_match_is_empty() {
        let dir = workspace();
        assert_eq!(hash_files(dir.path(), &p(&["*.lock"])).unwrap(), "");
    }

    #[test]
    fn test_recursive_and_negated_patterns() {
        let dir = workspace();
        let all = matching_files(dir.path(), &p(&["**/*.py"])).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = matching_files(dir.path(), &p(&["**/*.py", "!bcdi/utils/*.py"])).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].ends_with("__init__.py"));
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let dir = workspace();
        let top = matching_files(dir.path(), &p(&["bcdi/*.py"])).unwrap();
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = workspace();
        assert!(matches!(
            hash_files(dir.path(), &p(&["[unclosed"])),
            Err(HashError::Pattern { .. })
        ));
    }
}
