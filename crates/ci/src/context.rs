use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event that triggers a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Push to a branch
    Push,
    /// Pull request targeting a branch
    PullRequest,
    /// Manual dispatch
    #[serde(rename = "workflow_dispatch")]
    Manual,
}

impl EventKind {
    /// Event name as GitHub spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Manual => "workflow_dispatch",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "pull_request" | "pull-request" | "pr" => Ok(Self::PullRequest),
            "workflow_dispatch" | "manual" => Ok(Self::Manual),
            other => Err(format!(
                "unknown event '{other}' (expected push, pull_request or workflow_dispatch)"
            )),
        }
    }
}

/// The event a run reacts to: its kind and the branch it targets.
///
/// For pull requests the branch is the target (base) branch, which is what
/// `on.pull_request.branches` filters match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event kind
    pub kind: EventKind,
    /// Branch name without `refs/heads/`
    pub branch: String,
}

impl TriggerEvent {
    /// Create a trigger; a `refs/heads/` prefix is stripped from `branch`.
    pub fn new(kind: EventKind, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        let branch = branch
            .strip_prefix("refs/heads/")
            .map_or_else(|| branch.clone(), str::to_string);
        Self { kind, branch }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::PullRequest => write!(f, "pull_request into {}", self.branch),
            kind => write!(f, "{kind} to {}", self.branch),
        }
    }
}

/// Context information about the current CI environment.
///
/// Contains metadata about the CI provider, the triggering event and the
/// commit being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CIContext {
    /// The CI provider name ("github" or "local").
    pub provider: String,
    /// The event that triggered the run.
    pub trigger: TriggerEvent,
    /// The branch being built when it differs from the trigger branch
    /// (the pull request head branch).
    pub head_ref: Option<String>,
    /// The base ref for pull requests.
    pub base_ref: Option<String>,
    /// The git commit SHA, empty when unknown.
    pub sha: String,
    /// `owner/repo`, when known.
    pub repository: Option<String>,
}

impl Default for CIContext {
    fn default() -> Self {
        Self {
            provider: String::from("local"),
            trigger: TriggerEvent::new(EventKind::Push, "main"),
            head_ref: None,
            base_ref: None,
            sha: String::new(),
            repository: None,
        }
    }
}

impl CIContext {
    /// Replace the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerEvent) -> Self {
        self.trigger = trigger;
        self
    }

    /// `github.ref` value.
    #[must_use]
    pub fn git_ref(&self) -> String {
        let branch = self.head_ref.as_deref().unwrap_or(&self.trigger.branch);
        format!("refs/heads/{branch}")
    }
}

impl fmt::Display for CIContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.trigger)?;
        if !self.sha.is_empty() {
            write!(f, " ({})", self.sha.get(..7).unwrap_or(&self.sha))?;
        }
        Ok(())
    }
}
