//! Executor Configuration
//!
//! Workspace, cache and tool cache locations, cache policy and the overrides
//! that `stepwise.toml` and the command line apply on top of a workflow.

use indexmap::IndexMap;
use std::path::PathBuf;
use stepwise_core::config::CachePolicy;

/// Configuration for the pipeline executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Checked-out repository; steps run here
    pub workspace: PathBuf,

    /// Dependency cache root (default: `<cache dir>/deps`)
    pub cache_root: Option<PathBuf>,

    /// Tool cache root (default: `<cache dir>/toolcache`)
    pub toolcache_root: Option<PathBuf>,

    /// Cache read/write policy
    pub cache_policy: CachePolicy,

    /// Shell for `run` steps that declare none (default: bash)
    pub default_shell: Option<String>,

    /// Override every job's `strategy.fail-fast`
    pub fail_fast: Option<bool>,

    /// Extra environment for every step
    pub env: IndexMap<String, String>,

    /// Run even when the trigger does not match the workflow's filters
    pub force: bool,

    /// Parent directory of the per-run temporary directory
    pub temp_root: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            cache_root: None,
            toolcache_root: None,
            cache_policy: CachePolicy::Normal,
            default_shell: None,
            fail_fast: None,
            env: IndexMap::new(),
            force: false,
            temp_root: None,
        }
    }
}

impl ExecutorConfig {
    /// Create a new config for the given workspace
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    /// Set the dependency cache root
    #[must_use]
    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(cache_root.into());
        self
    }

    /// Set the tool cache root
    #[must_use]
    pub fn with_toolcache_root(mut self, toolcache_root: impl Into<PathBuf>) -> Self {
        self.toolcache_root = Some(toolcache_root.into());
        self
    }

    /// Set the cache policy
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Set the default shell
    #[must_use]
    pub fn with_default_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = Some(shell.into());
        self
    }

    /// Override `strategy.fail-fast`
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    /// Add an environment variable for every step
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Ignore trigger filters
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the parent of the per-run temporary directory
    #[must_use]
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    /// Get the effective dependency cache root
    ///
    /// # Errors
    /// Returns error if no cache root is configured and the platform cache
    /// directory cannot be determined
    pub fn effective_cache_root(&self) -> stepwise_core::Result<PathBuf> {
        match &self.cache_root {
            Some(root) => Ok(root.clone()),
            None => stepwise_core::paths::dependency_cache_dir(),
        }
    }

    /// Get the effective tool cache root
    ///
    /// # Errors
    /// Returns error if no tool cache root is configured and the platform
    /// cache directory cannot be determined
    pub fn effective_toolcache_root(&self) -> stepwise_core::Result<PathBuf> {
        match &self.toolcache_root {
            Some(root) => Ok(root.clone()),
            None => stepwise_core::paths::toolcache_dir(),
        }
    }
}
