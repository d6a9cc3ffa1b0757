//! Centralized path management for stepwise data directories.
//!
//! | Platform | Cache Dir | Tool Cache Dir |
//! |----------|-----------|----------------|
//! | **macOS** | `~/Library/Caches/stepwise` | `~/Library/Caches/stepwise/toolcache` |
//! | **Linux** | `~/.cache/stepwise` (XDG_CACHE_HOME) | `~/.cache/stepwise/toolcache` |
//! | **Windows** | `%LOCALAPPDATA%\stepwise` | `%LOCALAPPDATA%\stepwise\toolcache` |
//!
//! Environment variable overrides for testing and CI:
//! - `STEPWISE_CACHE_DIR` - Override cache directory
//! - `STEPWISE_TOOLCACHE_DIR` - Override tool cache directory

use crate::{Error, Result};
use std::path::PathBuf;

/// Get the cache directory for stepwise.
///
/// Resolution order:
/// 1. `STEPWISE_CACHE_DIR` environment variable
/// 2. Platform cache directory + `/stepwise`
///
/// # Errors
///
/// Returns an error if the cache directory cannot be determined.
pub fn cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("STEPWISE_CACHE_DIR")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    let base = dirs::cache_dir()
        .ok_or_else(|| Error::configuration("Could not determine cache directory"))?;

    Ok(base.join("stepwise"))
}

/// Directory holding dependency cache entries written by `actions/cache`.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be determined.
pub fn dependency_cache_dir() -> Result<PathBuf> {
    Ok(cache_dir()?.join("deps"))
}

/// Directory holding provisioned tools (Python virtual environments).
///
/// Resolution order:
/// 1. `STEPWISE_TOOLCACHE_DIR` environment variable
/// 2. [`cache_dir`] + `/toolcache`
///
/// # Errors
///
/// Returns an error if the cache directory cannot be determined.
pub fn toolcache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("STEPWISE_TOOLCACHE_DIR")
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    Ok(cache_dir()?.join("toolcache"))
}

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
