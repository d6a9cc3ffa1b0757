//! Event type definitions for structured stepwise events.
//!
//! Events are grouped by domain (pipeline, step, cache, output, system) and
//! carry the metadata needed to correlate them within a single run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured stepwise event with full metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepwiseEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Correlation ID shared by every event of one invocation.
    pub correlation_id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Tracing target that produced the event (e.g. `stepwise::step`).
    pub target: String,
    /// The event category and data.
    pub category: EventCategory,
}

impl StepwiseEvent {
    /// Create a new event with the given category.
    #[must_use]
    pub fn new(correlation_id: Uuid, target: impl Into<String>, category: EventCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            timestamp: Utc::now(),
            target: target.into(),
            category,
        }
    }

    /// Whether this is the terminal `system.shutdown` event.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self.category, EventCategory::System(SystemEvent::Shutdown))
    }
}

/// Event categories organized by domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventCategory {
    /// Whole-pipeline lifecycle.
    Pipeline(PipelineEvent),
    /// Individual step lifecycle.
    Step(StepEvent),
    /// Dependency cache activity.
    Cache(CacheEvent),
    /// Plain output not tied to a step.
    Output(OutputEvent),
    /// Process-level events.
    System(SystemEvent),
}

/// Pipeline lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent {
    /// A pipeline run started.
    Started {
        /// Pipeline name (job name plus matrix suffix).
        name: String,
        /// Trigger that started the run (`push`, `pull_request`, ...).
        trigger: String,
        /// Number of steps in the pipeline.
        step_count: usize,
    },
    /// The trigger did not match the pipeline's filters.
    NotTriggered {
        /// Pipeline name.
        name: String,
        /// Why the trigger was rejected.
        reason: String,
    },
    /// A pipeline run finished.
    Completed {
        /// Pipeline name.
        name: String,
        /// Whether the run succeeded.
        success: bool,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
}

/// Step lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StepEvent {
    /// Step started.
    Started {
        /// Step display name.
        name: String,
        /// Command or action being executed.
        command: String,
    },
    /// Step skipped because its condition evaluated to false.
    Skipped {
        /// Step display name.
        name: String,
        /// The condition source.
        condition: String,
    },
    /// Step produced a line of output.
    Output {
        /// Step display name.
        name: String,
        /// Output stream.
        stream: Stream,
        /// Output line, without the trailing newline.
        content: String,
    },
    /// Step finished.
    Completed {
        /// Step display name.
        name: String,
        /// Whether the step succeeded.
        success: bool,
        /// Exit code, if a process ran.
        exit_code: Option<i32>,
        /// Duration in milliseconds.
        duration_ms: u64,
        /// Failure was tolerated through `continue-on-error`.
        ignored: bool,
    },
}

/// Dependency cache events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum CacheEvent {
    /// Exact primary key hit.
    Hit {
        /// Primary key.
        key: String,
    },
    /// Partial hit through a restore key.
    Restored {
        /// Primary key that missed.
        key: String,
        /// Key of the entry actually restored.
        matched_key: String,
    },
    /// Nothing matched.
    Miss {
        /// Primary key.
        key: String,
    },
    /// A new entry was saved.
    Saved {
        /// Primary key.
        key: String,
        /// Archive size in bytes.
        size_bytes: u64,
    },
    /// The cache backend failed; the run continues without it.
    Unavailable {
        /// Primary key.
        key: String,
        /// Backend error.
        error: String,
    },
}

/// Process-level events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    /// No further events will be emitted.
    Shutdown,
}

/// Output not attributed to any step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutputEvent {
    /// Standard output.
    Stdout {
        /// Content to output.
        content: String,
    },
    /// Standard error.
    Stderr {
        /// Content to output.
        content: String,
    },
}

/// Output stream identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Stream {
    /// Name used in the `stream` tracing field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}
