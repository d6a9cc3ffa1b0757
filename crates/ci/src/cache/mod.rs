//! Dependency cache.
//!
//! A [`CacheKey`] pairs the exact primary key with ordered restore-key
//! prefixes. [`resolve`] implements the two-tier lookup: an exact hit on the
//! primary key, otherwise the first restore key with an exact or (newest)
//! prefix match, otherwise a miss.

pub mod backend;
pub mod local;

pub use backend::{BackendError, BackendResult, CacheBackend};
pub use local::LocalCacheBackend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version segment of the pip cache key; bump to invalidate every entry.
pub const PIP_KEY_VERSION: &str = "v0";

/// Lookup keys for one cache step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Exact key; also the key a new entry is saved under
    pub primary: String,
    /// Prefixes tried in order when the primary key misses
    pub restore_keys: Vec<String>,
}

impl CacheKey {
    /// Key with restore-key prefixes.
    pub fn new(primary: impl Into<String>, restore_keys: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            restore_keys,
        }
    }

    /// The pip dependency key: `{os}-pip-v0-{hash}` with restore prefix
    /// `{os}-pip-`.
    #[must_use]
    pub fn pip(os: &str, manifest_hash: &str) -> Self {
        Self {
            primary: format!("{os}-pip-{PIP_KEY_VERSION}-{manifest_hash}"),
            restore_keys: vec![format!("{os}-pip-")],
        }
    }
}

/// A stored cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry was saved under
    pub key: String,
    /// Creation time, used to pick the newest prefix match
    pub created_at: DateTime<Utc>,
    /// Archive size
    pub size_bytes: u64,
    /// Paths the entry was saved from, in archive order
    pub paths: Vec<String>,
}

/// Outcome of a two-tier lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The primary key matched exactly
    Exact(CacheEntry),
    /// A restore key matched
    Partial {
        /// Matched entry
        entry: CacheEntry,
        /// Restore key that produced the match
        restore_key: String,
    },
    /// Nothing matched
    Miss,
}

impl CacheLookup {
    /// Entry to restore, if any.
    #[must_use]
    pub const fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Exact(entry) | Self::Partial { entry, .. } => Some(entry),
            Self::Miss => None,
        }
    }

    /// Whether the primary key matched exactly.
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

/// Resolve `key` against the stored entries.
#[must_use]
pub fn resolve(entries: &[CacheEntry], key: &CacheKey) -> CacheLookup {
    if let Some(entry) = entries.iter().find(|e| e.key == key.primary) {
        return CacheLookup::Exact(entry.clone());
    }

    for restore_key in &key.restore_keys {
        let matched = entries
            .iter()
            .find(|e| &e.key == restore_key)
            .or_else(|| {
                entries
                    .iter()
                    .filter(|e| e.key.starts_with(restore_key.as_str()))
                    .max_by_key(|e| e.created_at)
            });
        if let Some(entry) = matched {
            return CacheLookup::Partial {
                entry: entry.clone(),
                restore_key: restore_key.clone(),
            };
        }
    }

    CacheLookup::Miss
}
