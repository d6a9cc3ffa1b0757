//! Custom tracing Layer for capturing stepwise events.
//!
//! This layer intercepts tracing events whose target starts with `stepwise::`
//! and which carry an `event_type` field, converts them into
//! [`StepwiseEvent`] values, and sends them over the run's [`event_channel`](crate::event_channel).

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::event::{
    CacheEvent, EventCategory, OutputEvent, PipelineEvent, StepEvent, StepwiseEvent, Stream,
    SystemEvent,
};
use crate::metadata::correlation_id;
use tokio::sync::mpsc;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Target prefix shared by every structured event.
pub const EVENT_TARGET_PREFIX: &str = "stepwise::";

/// A tracing Layer that captures stepwise-specific events.
pub struct StepwiseEventLayer {
    sender: mpsc::UnboundedSender<StepwiseEvent>,
}

impl StepwiseEventLayer {
    /// Create a new layer that sends events to the given channel.
    #[must_use]
    pub const fn new(sender: mpsc::UnboundedSender<StepwiseEvent>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for StepwiseEventLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if !target.starts_with(EVENT_TARGET_PREFIX) {
            return;
        }

        let mut visitor = EventVisitor::new(target);
        event.record(&mut visitor);

        if let Some(stepwise_event) = visitor.build() {
            let _ = self.sender.send(stepwise_event);
        }
    }
}

/// Visitor for extracting typed fields from tracing events.
#[derive(Default)]
struct EventVisitor {
    target: String,
    event_type: Option<String>,

    name: Option<String>,
    command: Option<String>,
    condition: Option<String>,
    trigger: Option<String>,
    reason: Option<String>,
    stream: Option<Stream>,
    content: Option<String>,
    success: Option<bool>,
    ignored: Option<bool>,
    exit_code: Option<i32>,
    duration_ms: Option<u64>,
    step_count: Option<usize>,

    key: Option<String>,
    matched_key: Option<String>,
    size_bytes: Option<u64>,
    error: Option<String>,
}

impl EventVisitor {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Self::default()
        }
    }

    fn build(self) -> Option<StepwiseEvent> {
        let event_type = self.event_type.as_deref()?;

        let category = match event_type {
            "pipeline.started" => EventCategory::Pipeline(PipelineEvent::Started {
                name: self.name?,
                trigger: self.trigger.unwrap_or_default(),
                step_count: self.step_count.unwrap_or(0),
            }),
            "pipeline.not_triggered" => EventCategory::Pipeline(PipelineEvent::NotTriggered {
                name: self.name?,
                reason: self.reason.unwrap_or_default(),
            }),
            "pipeline.completed" => EventCategory::Pipeline(PipelineEvent::Completed {
                name: self.name?,
                success: self.success?,
                duration_ms: self.duration_ms.unwrap_or(0),
            }),

            "step.started" => EventCategory::Step(StepEvent::Started {
                name: self.name?,
                command: self.command.unwrap_or_default(),
            }),
            "step.skipped" => EventCategory::Step(StepEvent::Skipped {
                name: self.name?,
                condition: self.condition.unwrap_or_default(),
            }),
            "step.output" => EventCategory::Step(StepEvent::Output {
                name: self.name?,
                stream: self.stream.unwrap_or(Stream::Stdout),
                content: self.content?,
            }),
            "step.completed" => EventCategory::Step(StepEvent::Completed {
                name: self.name?,
                success: self.success?,
                exit_code: self.exit_code,
                duration_ms: self.duration_ms.unwrap_or(0),
                ignored: self.ignored.unwrap_or(false),
            }),

            "cache.hit" => EventCategory::Cache(CacheEvent::Hit { key: self.key? }),
            "cache.restored" => EventCategory::Cache(CacheEvent::Restored {
                key: self.key?,
                matched_key: self.matched_key?,
            }),
            "cache.miss" => EventCategory::Cache(CacheEvent::Miss { key: self.key? }),
            "cache.saved" => EventCategory::Cache(CacheEvent::Saved {
                key: self.key?,
                size_bytes: self.size_bytes.unwrap_or(0),
            }),
            "cache.unavailable" => EventCategory::Cache(CacheEvent::Unavailable {
                key: self.key?,
                error: self.error.unwrap_or_default(),
            }),

            "output.stdout" => EventCategory::Output(OutputEvent::Stdout {
                content: self.content?,
            }),
            "output.stderr" => EventCategory::Output(OutputEvent::Stderr {
                content: self.content?,
            }),

            "system.shutdown" => EventCategory::System(SystemEvent::Shutdown),

            _ => return None,
        };

        Some(StepwiseEvent::new(correlation_id(), self.target, category))
    }

    fn record_text(&mut self, field: &str, value: String) {
        match field {
            "event_type" => self.event_type = Some(value),
            "name" | "step" | "pipeline" => self.name = Some(value),
            "command" => self.command = Some(value),
            "condition" => self.condition = Some(value),
            "trigger" => self.trigger = Some(value),
            "reason" => self.reason = Some(value),
            "content" => self.content = Some(value),
            "key" => self.key = Some(value),
            "matched_key" => self.matched_key = Some(value),
            "error" => self.error = Some(value),
            "stream" => {
                self.stream = match value.as_str() {
                    "stdout" => Some(Stream::Stdout),
                    "stderr" => Some(Stream::Stderr),
                    _ => None,
                };
            }
            _ => {}
        }
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        match field.name() {
            "exit_code" => self.exit_code = Some(value as i32),
            "duration_ms" => self.duration_ms = Some(value as u64),
            "step_count" => self.step_count = Some(value as usize),
            "size_bytes" => self.size_bytes = Some(value as u64),
            _ => {}
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "exit_code" => self.exit_code = Some(value as i32),
            "duration_ms" => self.duration_ms = Some(value),
            "step_count" => self.step_count = Some(value as usize),
            "size_bytes" => self.size_bytes = Some(value),
            _ => {}
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        match field.name() {
            "success" => self.success = Some(value),
            "ignored" => self.ignored = Some(value),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `%value` fields arrive here; their Debug output is the Display text.
        let text = format!("{value:?}");
        if field.name() == "exit_code" {
            // `?Option<i32>` renders as `Some(1)` or `None`
            self.exit_code = text
                .strip_prefix("Some(")
                .and_then(|s| s.strip_suffix(')'))
                .and_then(|s| s.parse().ok());
            return;
        }
        self.record_text(field.name(), text);
    }
}
