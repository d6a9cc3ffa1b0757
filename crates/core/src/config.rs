//! Configuration types for stepwise
//!
//! Loaded from an optional `stepwise.toml` at the workspace root. Every field
//! is optional; command-line flags take precedence over the file.
//!
//! ```toml
//! [run]
//! workflow = ".github/workflows/ci.yml"
//! shell = "bash"
//! fail_fast = true
//! env = { PIP_DISABLE_PIP_VERSION_CHECK = "1" }
//!
//! [cache]
//! dir = "/var/cache/stepwise"
//! policy = "readonly"
//!
//! [toolcache]
//! dir = "/opt/stepwise/tools"
//! ```

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Main configuration structure for stepwise
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Pipeline execution settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunConfig>,

    /// Dependency cache settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    /// Tool cache settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolcache: Option<ToolcacheConfig>,
}

/// `[run]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Workflow file used when `--workflow` is not given (relative to the workspace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<PathBuf>,

    /// Default shell for `run` steps that don't declare one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Override the workflow's `strategy.fail-fast`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,

    /// Extra environment variables injected into every step
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Base cache directory; entries live under `deps/`, tools under `toolcache/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Read/write policy for the dependency cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<CachePolicy>,
}

/// `[toolcache]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolcacheConfig {
    /// Root directory for provisioned interpreters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Cache read/write policy.
///
/// `Readonly` is useful for untrusted runs (fork pull requests) that may
/// consume the cache but must not populate it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Read and write
    #[default]
    Normal,
    /// Read only, never save
    Readonly,
    /// Save only, never restore
    Writeonly,
    /// Cache fully disabled
    Disabled,
}

impl CachePolicy {
    /// Whether cache lookups are allowed.
    #[must_use]
    pub const fn allows_read(self) -> bool {
        matches!(self, Self::Normal | Self::Readonly)
    }

    /// Whether cache saves are allowed.
    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::Normal | Self::Writeonly)
    }

    /// Lowercase name as used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Readonly => "readonly",
            Self::Writeonly => "writeonly",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Config {
    /// File name looked up at the workspace root.
    pub const FILE_NAME: &'static str = "stepwise.toml";

    /// Load `stepwise.toml` from `workspace`, or the default configuration if
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join(Self::FILE_NAME);
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| Error::io(e, &path, "read"))?;
        Self::from_toml_str(&content, &path)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming `path` if the TOML is invalid.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::configuration_with_help(
                format!("invalid {}: {}", path.display(), e.message()),
                "See the [run], [cache] and [toolcache] sections in the documentation",
            )
        })
    }

    /// Configured default workflow path.
    #[must_use]
    pub fn workflow(&self) -> Option<&Path> {
        self.run.as_ref().and_then(|r| r.workflow.as_deref())
    }

    /// Configured default shell.
    #[must_use]
    pub fn shell(&self) -> Option<&str> {
        self.run.as_ref().and_then(|r| r.shell.as_deref())
    }

    /// Configured fail-fast override.
    #[must_use]
    pub fn fail_fast(&self) -> Option<bool> {
        self.run.as_ref().and_then(|r| r.fail_fast)
    }

    /// Extra environment for every step.
    #[must_use]
    pub fn env(&self) -> IndexMap<String, String> {
        self.run.as_ref().map(|r| r.env.clone()).unwrap_or_default()
    }

    /// Configured cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache.as_ref().and_then(|c| c.dir.as_deref())
    }

    /// Configured cache policy.
    #[must_use]
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache.as_ref().and_then(|c| c.policy)
    }

    /// Configured tool cache directory.
    #[must_use]
    pub fn toolcache_dir(&self) -> Option<&Path> {
        self.toolcache.as_ref().and_then(|t| t.dir.as_deref())
    }
}
