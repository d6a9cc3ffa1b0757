//! Built-in actions for `uses:` steps.
//!
//! Actions are resolved by repository name; the `@ref` suffix is accepted and
//! ignored. An action returns outputs, environment and `PATH` additions for
//! later steps, plus an optional post-run hook (the cache save).

pub mod cache;
pub mod checkout;
pub mod setup_python;

use crate::cache::CacheBackend;
use crate::pipeline::ActionRef;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepwise_core::config::CachePolicy;
use thiserror::Error;

/// Actions available to `uses:` steps.
pub const SUPPORTED: &[&str] = &["actions/checkout", "actions/setup-python", "actions/cache"];

/// Whether `name` (without `@ref`) is a built-in action.
#[must_use]
pub fn is_supported(name: &str) -> bool {
    SUPPORTED.iter().any(|supported| supported.eq_ignore_ascii_case(name))
}

/// Error types for built-in actions
#[derive(Debug, Error)]
pub enum ActionError {
    /// A required `with:` input is missing or empty
    #[error("{action}: input required and not supplied: {input}")]
    MissingInput {
        action: &'static str,
        input: &'static str,
    },

    /// An input has an unusable value
    #[error("{action}: invalid value for input '{input}': {message}")]
    InvalidInput {
        action: &'static str,
        input: &'static str,
        message: String,
    },

    /// The runner environment could not be prepared
    #[error("{message}")]
    EnvironmentSetup {
        message: String,
        help: Option<String>,
    },

    /// `fail-on-cache-miss` was set and nothing matched
    #[error("Failed to restore cache entry. Exiting as fail-on-cache-miss is set. Input key: {key}")]
    CacheMiss { key: String },

    /// A cache backend error that cannot be degraded to a miss
    #[error("cache restore failed: {0}")]
    Cache(#[from] crate::cache::BackendError),

    /// The action is not built in
    #[error("unsupported action '{0}'")]
    Unsupported(String),
}

impl ActionError {
    /// Create an environment setup error with optional help.
    pub fn environment_setup(message: impl Into<String>, help: Option<&str>) -> Self {
        Self::EnvironmentSetup {
            message: message.into(),
            help: help.map(str::to_string),
        }
    }
}

impl From<ActionError> for stepwise_core::Error {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::EnvironmentSetup { message, help } => {
                Self::environment_setup(message, help)
            }
            ActionError::Cache(source) => Self::cache(source.to_string()),
            other => Self::execution(other.to_string()),
        }
    }
}

/// Runner state an action may read.
#[derive(Clone)]
pub struct ActionContext<'a> {
    /// Checked-out workspace
    pub workspace: &'a Path,
    /// Root of provisioned tools
    pub toolcache: &'a Path,
    /// Environment the step would run with
    pub env: &'a IndexMap<String, String>,
    /// Dependency cache, if enabled
    pub cache: Option<Arc<dyn CacheBackend>>,
    /// Cache read/write policy
    pub cache_policy: CachePolicy,
}

impl ActionContext<'_> {
    /// `PATH` of the step environment, falling back to the process `PATH`.
    #[must_use]
    pub fn search_path(&self) -> Option<String> {
        self.env
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var("PATH").ok())
    }

    /// Resolve a user-supplied path: `~` is expanded and relative paths are
    /// taken from the workspace.
    #[must_use]
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = stepwise_core::paths::expand_home(raw);
        if expanded.is_absolute() {
            expanded
        } else {
            self.workspace.join(expanded)
        }
    }
}

/// Work registered by an action to run after the main steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    /// Save `paths` into the dependency cache under `key`
    SaveCache {
        /// Primary key
        key: String,
        /// Paths to archive
        paths: Vec<PathBuf>,
    },
}

/// What an action hands back to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// `steps.<id>.outputs`
    pub outputs: IndexMap<String, String>,
    /// Environment for later steps
    pub env: IndexMap<String, String>,
    /// Directories prepended to `PATH` for later steps
    pub path: Vec<PathBuf>,
    /// Post-run hook
    pub post: Option<PostAction>,
}

impl ActionOutcome {
    /// Record an output.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }
}

/// Run the built-in action `action` with rendered `with:` inputs.
///
/// # Errors
///
/// Returns an error when the action fails; the step then fails.
#[tracing::instrument(name = "action", skip_all, fields(action = %action))]
pub async fn run(
    action: &ActionRef,
    inputs: &IndexMap<String, String>,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    match action.name.to_ascii_lowercase().as_str() {
        "actions/checkout" => checkout::run(ctx).await,
        "actions/setup-python" => setup_python::run(inputs, ctx).await,
        "actions/cache" => cache::run(inputs, ctx).await,
        _ => Err(ActionError::Unsupported(action.name.clone())),
    }
}

/// Read an input, treating empty values as absent.
pub(crate) fn input<'a>(inputs: &'a IndexMap<String, String>, name: &str) -> Option<&'a str> {
    inputs
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Parse a boolean input the way the toolkit does: `true`/`false`, any case.
pub(crate) fn bool_input(
    action: &'static str,
    inputs: &IndexMap<String, String>,
    name: &'static str,
) -> Result<bool, ActionError> {
    match input(inputs, name) {
        None => Ok(false),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(ActionError::InvalidInput {
            action,
            input: name,
            message: format!("expected true or false, got '{value}'"),
        }),
    }
}

/// Split a multi-line input into non-empty trimmed lines.
pub(crate) fn multiline_input(inputs: &IndexMap<String, String>, name: &str) -> Vec<String> {
    inputs
        .get(name)
        .map(|value| {
            value
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_supported_actions() {
        assert!(is_supported("actions/checkout"));
        assert!(is_supported("Actions/Setup-Python"));
        assert!(is_supported("actions/cache"));
        assert!(!is_supported("actions/upload-artifact"));
    }

    #[test]
    fn test_bool_input() {
        let map = inputs(&[("lookup-only", "TRUE"), ("bad", "yes")]);
        assert!(bool_input("actions/cache", &map, "lookup-only").unwrap());
        assert!(!bool_input("actions/cache", &map, "fail-on-cache-miss").unwrap());
        assert!(matches!(
            bool_input("actions/cache", &map, "bad"),
            Err(ActionError::InvalidInput { input: "bad", .. })
        ));
    }

    #[test]
    fn test_multiline_input() {
        let map = inputs(&[("path", "\n  ~/.cache/pip \n\nvenv\n")]);
        assert_eq!(multiline_input(&map, "path"), vec!["~/.cache/pip", "venv"]);
        assert!(multiline_input(&map, "missing").is_empty());
    }

    #[test]
    fn test_resolve_path() {
        let env = IndexMap::new();
        let ctx = ActionContext {
            workspace: Path::new("/work"),
            toolcache: Path::new("/tools"),
            env: &env,
            cache: None,
            cache_policy: CachePolicy::Normal,
        };
        assert_eq!(ctx.resolve_path("venv"), PathBuf::from("/work/venv"));
        assert_eq!(ctx.resolve_path("/opt/py"), PathBuf::from("/opt/py"));
    }

    #[test]
    fn test_environment_error_converts_with_help() {
        let err: stepwise_core::Error =
            ActionError::environment_setup("no python", Some("install it")).into();
        assert!(matches!(
            err,
            stepwise_core::Error::EnvironmentSetup { help: Some(_), .. }
        ));
    }
}
