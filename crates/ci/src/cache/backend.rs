//! Cache Backend Abstraction
//!
//! Defines the `CacheBackend` trait for pluggable cache implementations.

use super::{CacheEntry, CacheKey, CacheLookup, resolve};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for cache backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO error during cache operations (generic, for #[from] compatibility)
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error with path context for better diagnostics
    #[error("Failed to {operation} '{path}': {source}")]
    IoWithContext {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cache storage unavailable (gracefully degradable)
    ///
    /// Execution continues without caching.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// None of the paths to save exist
    #[error("Path(s) specified for caching do not exist, nothing to save")]
    NothingToSave,

    /// An entry with this key already exists; entries are immutable
    #[error("Unable to reserve cache with key {key}, an entry already exists")]
    AlreadyExists { key: String },

    /// An archive member would escape its restore path
    #[error("Refusing to restore unsafe archive path '{path}'")]
    UnsafePath { path: String },
}

impl BackendError {
    /// Returns true if this error indicates the cache is unavailable but
    /// execution should continue without caching (graceful degradation).
    #[must_use]
    pub fn is_gracefully_degradable(&self) -> bool {
        !matches!(self, Self::UnsafePath { .. })
    }

    /// Create an IO error with path context
    pub fn io_with_context(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::IoWithContext {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Result type for cache backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Cache backend trait for pluggable cache implementations
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// All stored entries
    ///
    /// # Errors
    /// Returns error if the store cannot be listed
    async fn entries(&self) -> BackendResult<Vec<CacheEntry>>;

    /// Two-tier lookup of `key`
    ///
    /// # Errors
    /// Returns error if the store cannot be listed
    async fn lookup(&self, key: &CacheKey) -> BackendResult<CacheLookup> {
        let entries = self.entries().await?;
        Ok(resolve(&entries, key))
    }

    /// Restore `entry` into `paths` (archive order); returns bytes read
    ///
    /// # Errors
    /// Returns error if the archive is missing or cannot be extracted
    async fn restore(&self, entry: &CacheEntry, paths: &[PathBuf]) -> BackendResult<u64>;

    /// Save `paths` under `key`
    ///
    /// # Errors
    /// Returns error if nothing exists to save, the key is taken, or IO fails
    async fn save(&self, key: &str, paths: &[PathBuf]) -> BackendResult<CacheEntry>;

    /// Remove the entry stored under `key`; `false` when absent
    ///
    /// # Errors
    /// Returns error if removal fails
    async fn remove(&self, key: &str) -> BackendResult<bool>;

    /// Remove every entry whose key starts with `prefix` (all when `None`)
    ///
    /// # Errors
    /// Returns error if listing or removal fails
    async fn clear(&self, prefix: Option<&str>) -> BackendResult<usize> {
        let mut removed = 0;
        for entry in self.entries().await? {
            if prefix.is_none_or(|p| entry.key.starts_with(p)) && self.remove(&entry.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
