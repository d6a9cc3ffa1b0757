//! `stepwise cache`

use super::{Outcome, data_dirs, resolve_workspace};
use crate::cli::{CacheCommands, CliError, OkEnvelope};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use stepwise_ci::cache::{BackendError, CacheBackend, CacheKey, LocalCacheBackend};
use stepwise_ci::hashing::hash_files;
use stepwise_core::config::Config;

/// Run a cache subcommand.
///
/// # Errors
///
/// Returns an error when the manifest cannot be hashed or the cache cannot
/// be read or modified.
pub async fn execute(command: CacheCommands, json: bool) -> Result<Outcome, CliError> {
    match command {
        CacheCommands::Key {
            os,
            manifest,
            workspace,
        } => key(&os, &manifest, workspace.as_deref(), json),
        CacheCommands::List { cache_dir } => list(backend(cache_dir.as_deref())?, json).await,
        CacheCommands::Clear { prefix, cache_dir } => {
            clear(backend(cache_dir.as_deref())?, prefix.as_deref(), json).await
        }
    }
}

fn backend(cache_dir: Option<&Path>) -> Result<LocalCacheBackend, CliError> {
    // `stepwise.toml` in the current directory may relocate the cache
    let config = match std::env::current_dir() {
        Ok(cwd) => Config::load(&cwd)?,
        Err(_) => Config::default(),
    };
    Ok(LocalCacheBackend::new(data_dirs(cache_dir, &config)?.deps))
}

fn backend_error(err: BackendError) -> CliError {
    CliError::other_with_help(err.to_string(), "Check the cache directory or pass --cache-dir")
}

fn envelope<T: Serialize>(data: T) -> Result<Outcome, CliError> {
    serde_json::to_string_pretty(&OkEnvelope::new(data))
        .map(Outcome::output)
        .map_err(|e| CliError::other(format!("Failed to serialize result: {e}")))
}

#[derive(Debug, Serialize)]
struct KeyInfo {
    key: String,
    restore_keys: Vec<String>,
    manifest_hash: String,
}

fn key(os: &str, manifest: &str, workspace: Option<&Path>, json: bool) -> Result<Outcome, CliError> {
    let workspace = resolve_workspace(workspace)?;
    let hash = hash_files(&workspace, &[manifest.to_string()])
        .map_err(|e| CliError::config(format!("Cannot hash {manifest}: {e}")))?;
    if hash.is_empty() {
        tracing::warn!(manifest, "Manifest not found; the key has an empty hash");
    }
    let key = CacheKey::pip(os, &hash);

    if json {
        return envelope(KeyInfo {
            key: key.primary,
            restore_keys: key.restore_keys,
            manifest_hash: hash,
        });
    }
    let mut out = key.primary;
    for restore in &key.restore_keys {
        let _ = write!(out, "\nrestore-key: {restore}");
    }
    Ok(Outcome::output(out))
}

async fn list(backend: LocalCacheBackend, json: bool) -> Result<Outcome, CliError> {
    let entries = backend.entries().await.map_err(backend_error)?;
    if json {
        return envelope(entries);
    }
    if entries.is_empty() {
        return Ok(Outcome::output(format!(
            "No cache entries in {}",
            backend.root().display()
        )));
    }

    let mut out = String::new();
    for entry in &entries {
        let _ = writeln!(
            out,
            "{}\t{}\t{} bytes",
            entry.key,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.size_bytes
        );
    }
    let _ = write!(out, "{} entries", entries.len());
    Ok(Outcome::output(out))
}

async fn clear(
    backend: LocalCacheBackend,
    prefix: Option<&str>,
    json: bool,
) -> Result<Outcome, CliError> {
    let removed = backend.clear(prefix).await.map_err(backend_error)?;
    tracing::info!(removed, ?prefix, "Cleared cache entries");
    if json {
        return envelope(serde_json::json!({ "removed": removed }));
    }
    Ok(Outcome::output(format!("Removed {removed} cache entries")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_uses_manifest_hash() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "numpy\n").unwrap();

        let outcome = key("ubuntu-latest", "requirements.txt", Some(dir.path()), false).unwrap();
        let text = outcome.output.unwrap();
        let mut lines = text.lines();
        let primary = lines.next().unwrap();
        assert!(primary.starts_with("ubuntu-latest-pip-v0-"));
        assert_eq!(primary.len(), "ubuntu-latest-pip-v0-".len() + 64);
        assert_eq!(lines.next(), Some("restore-key: ubuntu-latest-pip-"));
    }

    #[test]
    fn test_key_changes_with_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("requirements.txt");
        std::fs::write(&manifest, "numpy\n").unwrap();
        let first = key("ubuntu-latest", "requirements.txt", Some(dir.path()), false)
            .unwrap()
            .output;
        std::fs::write(&manifest, "numpy\nscipy\n").unwrap();
        let second = key("ubuntu-latest", "requirements.txt", Some(dir.path()), false)
            .unwrap()
            .output;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_list_and_clear_by_prefix() {
        let data = TempDir::new().unwrap();
        let site = TempDir::new().unwrap();
        std::fs::write(site.path().join("pkg.py"), "x = 1\n").unwrap();

        let backend = LocalCacheBackend::new(data.path());
        let paths = vec![site.path().to_path_buf()];
        backend.save("ubuntu-latest-pip-v0-aaa", &paths).await.unwrap();
        backend.save("macos-latest-pip-v0-bbb", &paths).await.unwrap();

        let listed = list(LocalCacheBackend::new(data.path()), false)
            .await
            .unwrap()
            .output
            .unwrap();
        assert!(listed.contains("ubuntu-latest-pip-v0-aaa"));
        assert!(listed.ends_with("2 entries"));

        let cleared = clear(LocalCacheBackend::new(data.path()), Some("ubuntu-"), false)
            .await
            .unwrap();
        assert_eq!(cleared.output.as_deref(), Some("Removed 1 cache entries"));
        assert_eq!(backend.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_empty_cache() {
        let data = TempDir::new().unwrap();
        let outcome = list(LocalCacheBackend::new(data.path().join("deps")), false)
            .await
            .unwrap();
        assert!(outcome.output.unwrap().starts_with("No cache entries"));
    }
}
