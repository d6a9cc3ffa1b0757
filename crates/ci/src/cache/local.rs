//! File-based cache backend.
//!
//! Layout: `{root}/{sha256(key)}/metadata.json` next to `archive.tar.gz`.
//! Archive members are prefixed with the index of the path they came from
//! (`0/...`, `1/...`), so one entry can hold several unrelated directories.
//! Archives and metadata are written to temporary files and renamed into
//! place, so a crashed save never leaves a readable partial entry.

use super::CacheEntry;
use super::backend::{BackendError, BackendResult, CacheBackend};
use async_trait::async_trait;
use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

const METADATA_FILE: &str = "metadata.json";
const ARCHIVE_FILE: &str = "archive.tar.gz";

/// File-based cache for local runs
#[derive(Debug, Clone)]
pub struct LocalCacheBackend {
    root: PathBuf,
}

impl LocalCacheBackend {
    /// Create a backend rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(Sha256::digest(key.as_bytes())))
    }

    async fn blocking<T, F>(f: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> BackendResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| BackendError::Unavailable(format!("cache task failed: {e}")))?
    }
}

#[async_trait]
impl CacheBackend for LocalCacheBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn entries(&self) -> BackendResult<Vec<CacheEntry>> {
        let root = self.root.clone();
        Self::blocking(move || read_entries(&root)).await
    }

    async fn restore(&self, entry: &CacheEntry, paths: &[PathBuf]) -> BackendResult<u64> {
        let archive = self.entry_dir(&entry.key).join(ARCHIVE_FILE);
        let paths = paths.to_vec();
        let key = entry.key.clone();
        let bytes = Self::blocking(move || extract_archive(&archive, &paths)).await?;
        tracing::debug!(key = %key, bytes, "Restored cache entry");
        Ok(bytes)
    }

    async fn save(&self, key: &str, paths: &[PathBuf]) -> BackendResult<CacheEntry> {
        let dir = self.entry_dir(key);
        let root = self.root.clone();
        let key = key.to_string();
        let paths = paths.to_vec();
        Self::blocking(move || write_entry(&root, &dir, &key, &paths)).await
    }

    async fn remove(&self, key: &str) -> BackendResult<bool> {
        let dir = self.entry_dir(key);
        Self::blocking(move || {
            if !dir.exists() {
                return Ok(false);
            }
            fs::remove_dir_all(&dir)
                .map_err(|e| BackendError::io_with_context("remove", &dir, e))?;
            Ok(true)
        })
        .await
    }
}

fn read_entries(root: &Path) -> BackendResult<Vec<CacheEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let dir = fs::read_dir(root).map_err(|e| BackendError::io_with_context("read", root, e))?;

    let mut entries = Vec::new();
    for item in dir {
        let item = item.map_err(|e| BackendError::io_with_context("read", root, e))?;
        let metadata_path = item.path().join(METADATA_FILE);
        if !metadata_path.is_file() || !item.path().join(ARCHIVE_FILE).is_file() {
            continue;
        }
        let parsed = fs::read_to_string(&metadata_path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<CacheEntry>(&json).map_err(|e| e.to_string()));
        match parsed {
            Ok(entry) => entries.push(entry),
            Err(error) => tracing::warn!(
                path = %metadata_path.display(),
                %error,
                "Skipping unreadable cache metadata"
            ),
        }
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

fn write_entry(root: &Path, dir: &Path, key: &str, paths: &[PathBuf]) -> BackendResult<CacheEntry> {
    if dir.join(METADATA_FILE).exists() {
        return Err(BackendError::AlreadyExists {
            key: key.to_string(),
        });
    }
    if !paths.iter().any(|p| p.exists()) {
        return Err(BackendError::NothingToSave);
    }

    fs::create_dir_all(root).map_err(|e| BackendError::io_with_context("create directory", root, e))?;
    let tmp_archive = root.join(format!(".{}.tar.gz.tmp", uuid::Uuid::new_v4()));
    let result = write_archive(&tmp_archive, paths).and_then(|()| {
        fs::create_dir_all(dir)
            .map_err(|e| BackendError::io_with_context("create directory", dir, e))?;
        let archive = dir.join(ARCHIVE_FILE);
        fs::rename(&tmp_archive, &archive)
            .map_err(|e| BackendError::io_with_context("rename", &archive, e))?;
        let size_bytes = fs::metadata(&archive)
            .map_err(|e| BackendError::io_with_context("stat", &archive, e))?
            .len();

        let entry = CacheEntry {
            key: key.to_string(),
            created_at: Utc::now(),
            size_bytes,
            paths: paths.iter().map(|p| p.display().to_string()).collect(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        let tmp_meta = dir.join(format!("{METADATA_FILE}.tmp"));
        fs::write(&tmp_meta, json).map_err(|e| BackendError::io_with_context("write", &tmp_meta, e))?;
        let meta = dir.join(METADATA_FILE);
        fs::rename(&tmp_meta, &meta).map_err(|e| BackendError::io_with_context("rename", &meta, e))?;
        Ok(entry)
    });

    if result.is_err() {
        let _ = fs::remove_file(&tmp_archive);
    }
    if let Ok(entry) = &result {
        tracing::debug!(
            key = %entry.key,
            size_bytes = entry.size_bytes,
            path = %dir.display(),
            "Cache entry stored"
        );
    }
    result
}

fn write_archive(target: &Path, paths: &[PathBuf]) -> BackendResult<()> {
    let file = File::create(target).map_err(|e| BackendError::io_with_context("create", target, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for (index, path) in paths.iter().enumerate() {
        let name = index.to_string();
        if path.is_dir() {
            builder
                .append_dir_all(&name, path)
                .map_err(|e| BackendError::io_with_context("archive", path, e))?;
        } else if path.is_file() {
            builder
                .append_path_with_name(path, &name)
                .map_err(|e| BackendError::io_with_context("archive", path, e))?;
        } else {
            tracing::warn!(path = %path.display(), "Cache path does not exist, skipping");
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| BackendError::io_with_context("finish", target, e))?;
    encoder
        .finish()
        .map_err(|e| BackendError::io_with_context("finish", target, e))?;
    Ok(())
}

fn extract_archive(archive: &Path, paths: &[PathBuf]) -> BackendResult<u64> {
    let file = File::open(archive).map_err(|e| BackendError::io_with_context("open", archive, e))?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    let mut bytes = 0;

    let members = reader
        .entries()
        .map_err(|e| BackendError::io_with_context("read", archive, e))?;
    for member in members {
        let mut member = member.map_err(|e| BackendError::io_with_context("read", archive, e))?;
        let member_path = member
            .path()
            .map_err(|e| BackendError::io_with_context("read", archive, e))?
            .into_owned();
        let Some(target) = restore_target(&member_path, paths)? else {
            continue;
        };

        if member.header().entry_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| BackendError::io_with_context("create directory", &target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BackendError::io_with_context("create directory", parent, e))?;
        }
        if target.symlink_metadata().is_ok_and(|meta| !meta.is_dir()) {
            fs::remove_file(&target)
                .map_err(|e| BackendError::io_with_context("replace", &target, e))?;
        }
        bytes += member.header().size().unwrap_or(0);
        member
            .unpack(&target)
            .map_err(|e| BackendError::io_with_context("unpack", &target, e))?;
    }
    Ok(bytes)
}

/// Map `3/lib/x.py` to `paths[3]/lib/x.py`; members for paths the caller did
/// not ask for are skipped.
fn restore_target(member: &Path, paths: &[PathBuf]) -> BackendResult<Option<PathBuf>> {
    let mut components = member.components();
    let index = match components.next() {
        Some(Component::Normal(first)) => first.to_str().and_then(|s| s.parse::<usize>().ok()),
        _ => None,
    };
    let Some(index) = index else {
        return Err(BackendError::UnsafePath {
            path: member.display().to_string(),
        });
    };

    let mut target = match paths.get(index) {
        Some(base) => base.clone(),
        None => return Ok(None),
    };
    for component in components {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => {
                return Err(BackendError::UnsafePath {
                    path: member.display().to_string(),
                });
            }
        }
    }
    Ok(Some(target))
}
