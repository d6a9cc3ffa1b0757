//! Pipeline run reporting
//!
//! Provides the result types of a run and their renderings:
//! - [`RunResult`] for one job and matrix combination
//! - [`WorkflowReport`] aggregating every run of an invocation
//! - JSON ([`json`]), markdown step summary ([`markdown`]) and plain text
//!   ([`terminal`]) renderings

use crate::context::CIContext;
use crate::workflow::Combination;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod json;
pub mod markdown;
pub mod terminal;

/// Report format version.
pub const REPORT_VERSION: &str = "1";

/// Final status of one step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step exited zero.
    Success,
    /// Step failed and halted the run.
    Failed,
    /// Advisory step failed; the run continued.
    FailedIgnored,
    /// Condition evaluated to false.
    Skipped,
    /// Never reached because the run halted earlier.
    NotRun,
    /// Interrupted by cancellation.
    Cancelled,
}

impl StepStatus {
    /// Human label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::FailedIgnored => "failed (ignored)",
            Self::Skipped => "skipped",
            Self::NotRun => "not run",
            Self::Cancelled => "cancelled",
        }
    }

    /// Status icon.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Failed => "✗",
            Self::FailedIgnored => "!",
            Self::Skipped => "-",
            Self::NotRun => "·",
            Self::Cancelled => "⊘",
        }
    }

    /// `steps.<id>.outcome`: the result before `continue-on-error`.
    #[must_use]
    pub const fn outcome(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed | Self::FailedIgnored => "failure",
            Self::Skipped | Self::NotRun => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    /// `steps.<id>.conclusion`: the result after `continue-on-error`.
    #[must_use]
    pub const fn conclusion(self) -> &'static str {
        match self {
            Self::FailedIgnored => "success",
            other => other.outcome(),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Overall status of a run or of a whole invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every non-advisory step succeeded.
    Success,
    /// A non-advisory step failed.
    Failed,
    /// Interrupted.
    Cancelled,
    /// The trigger event does not match the workflow's filters.
    NotTriggered,
    /// Not started because an earlier matrix combination failed.
    Skipped,
}

impl RunStatus {
    /// Process exit code for this status.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success | Self::NotTriggered | Self::Skipped => 0,
            Self::Failed => 1,
            Self::Cancelled => 130,
        }
    }

    /// Human label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::NotTriggered => "not triggered",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    /// Position in the job.
    pub index: usize,
    /// Step id, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rendered step name.
    pub name: String,
    /// Command line or action reference.
    pub command: String,
    /// Final status.
    pub status: StepStatus,
    /// Process exit code (run steps that exited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// `steps.<id>.outputs`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
    /// Failure reason other than an exit code (timeout, action error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Captured stdout and stderr of a failed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl StepReport {
    /// A step that never executed.
    #[must_use]
    pub fn not_executed(
        index: usize,
        id: Option<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        status: StepStatus,
    ) -> Self {
        Self {
            index,
            id,
            name: name.into(),
            command: command.into(),
            status,
            exit_code: None,
            duration_ms: 0,
            outputs: IndexMap::new(),
            error: None,
            output: None,
        }
    }
}

/// Result of one job for one matrix combination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// Job key.
    pub job_id: String,
    /// Job display name.
    pub job_name: String,
    /// Matrix combination.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub matrix: Combination,
    /// Overall status.
    pub status: RunStatus,
    /// Why the run did not start (not triggered, skipped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Index into `steps` of the step that halted the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<usize>,
    /// Per-step results in execution order.
    pub steps: Vec<StepReport>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunResult {
    /// A run that never started.
    #[must_use]
    pub fn not_started(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        matrix: Combination,
        status: RunStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            matrix,
            status,
            reason: Some(reason.into()),
            first_failure: None,
            steps: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// The step that halted the run.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.first_failure.and_then(|index| self.steps.get(index))
    }

    /// Step result by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id.as_deref() == Some(id))
    }

    /// Number of steps with `status`.
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Process exit code for this run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Trigger and repository information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextReport {
    /// Provider name (github, local).
    pub provider: String,
    /// Event kind.
    pub event: String,
    /// Branch the trigger targets.
    pub branch: String,
    /// Commit SHA.
    pub sha: String,
}

impl From<&CIContext> for ContextReport {
    fn from(ctx: &CIContext) -> Self {
        Self {
            provider: ctx.provider.clone(),
            event: ctx.trigger.kind.as_str().to_string(),
            branch: ctx.trigger.branch.clone(),
            sha: ctx.sha.clone(),
        }
    }
}

/// Every run of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowReport {
    /// Report format version.
    pub version: String,
    /// Workflow name.
    pub workflow: String,
    /// Trigger context.
    pub context: ContextReport,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    /// Aggregate status.
    pub status: RunStatus,
    /// Individual runs.
    pub runs: Vec<RunResult>,
}

impl WorkflowReport {
    /// Aggregate run statuses: cancellation wins over failure, failure over
    /// success, and an invocation is "not triggered" only when no run was.
    #[must_use]
    pub fn aggregate(runs: &[RunResult]) -> RunStatus {
        if runs.iter().any(|r| r.status == RunStatus::Cancelled) {
            RunStatus::Cancelled
        } else if runs.iter().any(|r| r.status == RunStatus::Failed) {
            RunStatus::Failed
        } else if !runs.is_empty() && runs.iter().all(|r| r.status == RunStatus::NotTriggered) {
            RunStatus::NotTriggered
        } else {
            RunStatus::Success
        }
    }

    /// Process exit code for the invocation.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: RunStatus) -> RunResult {
        RunResult::not_started("build", "build", Combination::new(), status, "test")
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::NotTriggered.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(
            WorkflowReport::aggregate(&[run(RunStatus::Success), run(RunStatus::Failed)]),
            RunStatus::Failed
        );
        assert_eq!(
            WorkflowReport::aggregate(&[run(RunStatus::Failed), run(RunStatus::Skipped)]),
            RunStatus::Failed
        );
        assert_eq!(
            WorkflowReport::aggregate(&[run(RunStatus::Failed), run(RunStatus::Cancelled)]),
            RunStatus::Cancelled
        );
        assert_eq!(
            WorkflowReport::aggregate(&[run(RunStatus::NotTriggered)]),
            RunStatus::NotTriggered
        );
        assert_eq!(
            WorkflowReport::aggregate(&[run(RunStatus::NotTriggered), run(RunStatus::Success)]),
            RunStatus::Success
        );
    }

    #[test]
    fn test_outcome_and_conclusion() {
        assert_eq!(StepStatus::FailedIgnored.outcome(), "failure");
        assert_eq!(StepStatus::FailedIgnored.conclusion(), "success");
        assert_eq!(StepStatus::Failed.conclusion(), "failure");
        assert_eq!(StepStatus::Skipped.conclusion(), "skipped");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&StepStatus::FailedIgnored).unwrap(),
            "\"failed_ignored\""
        );
        assert_eq!(
            serde_json::to_string(&RunStatus::NotTriggered).unwrap(),
            "\"not_triggered\""
        );
    }
}
