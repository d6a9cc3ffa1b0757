//! Structured event system for stepwise.
//!
//! Pipeline progress is emitted through tracing macros with a `stepwise::*`
//! target and an `event_type` field. [`StepwiseEventLayer`] captures those
//! events into typed [`StepwiseEvent`] values and sends them over the run's
//! [`event_channel`] to the renderer (CLI or JSON) that turns them into output.
//!
//! ```rust,ignore
//! use stepwise_events::{StepwiseEventLayer, emit_step_started, event_channel};
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let (sender, receiver) = event_channel();
//! let layer = StepwiseEventLayer::new(sender);
//! tracing_subscriber::registry().with(layer).init();
//!
//! emit_step_started!("Test with pytest", "pytest");
//! ```

pub mod channel;
pub mod event;
pub mod layer;
pub mod metadata;
pub mod renderers;

pub use channel::{EventReceiver, event_channel};
pub use event::{
    CacheEvent, EventCategory, OutputEvent, PipelineEvent, StepEvent, StepwiseEvent, Stream,
    SystemEvent,
};
pub use layer::{EVENT_TARGET_PREFIX, StepwiseEventLayer};
pub use metadata::{correlation_id, set_correlation_id};
pub use renderers::{CliRenderer, CliRendererConfig, JsonRenderer};

// Pipeline events

/// Emit a pipeline started event.
///
/// ```rust,ignore
/// emit_pipeline_started!("build (ubuntu-latest, 3.9)", "push", 11_usize);
/// ```
#[macro_export]
macro_rules! emit_pipeline_started {
    ($name:expr, $trigger:expr, $step_count:expr) => {
        ::tracing::info!(
            target: "stepwise::pipeline",
            event_type = "pipeline.started",
            name = %$name,
            trigger = %$trigger,
            step_count = $step_count,
        )
    };
}

/// Emit a pipeline not-triggered event.
#[macro_export]
macro_rules! emit_pipeline_not_triggered {
    ($name:expr, $reason:expr) => {
        ::tracing::info!(
            target: "stepwise::pipeline",
            event_type = "pipeline.not_triggered",
            name = %$name,
            reason = %$reason,
        )
    };
}

/// Emit a pipeline completed event.
#[macro_export]
macro_rules! emit_pipeline_completed {
    ($name:expr, $success:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "stepwise::pipeline",
            event_type = "pipeline.completed",
            name = %$name,
            success = $success,
            duration_ms = $duration_ms,
        )
    };
}

// Step events

/// Emit a step started event.
#[macro_export]
macro_rules! emit_step_started {
    ($name:expr, $command:expr) => {
        ::tracing::info!(
            target: "stepwise::step",
            event_type = "step.started",
            name = %$name,
            command = %$command,
        )
    };
}

/// Emit a step skipped event.
#[macro_export]
macro_rules! emit_step_skipped {
    ($name:expr, $condition:expr) => {
        ::tracing::info!(
            target: "stepwise::step",
            event_type = "step.skipped",
            name = %$name,
            condition = %$condition,
        )
    };
}

/// Emit one line of step output.
///
/// ```rust,ignore
/// emit_step_output!("Test with pytest", Stream::Stdout, "collected 12 items");
/// ```
#[macro_export]
macro_rules! emit_step_output {
    ($name:expr, $stream:expr, $content:expr) => {
        ::tracing::info!(
            target: "stepwise::step",
            event_type = "step.output",
            name = %$name,
            stream = $stream.as_str(),
            content = %$content,
        )
    };
}

/// Emit a step completed event.
///
/// ```rust,ignore
/// emit_step_completed!("Lint with flake8", false, Some(1), 830_u64, true);
/// ```
#[macro_export]
macro_rules! emit_step_completed {
    ($name:expr, $success:expr, $exit_code:expr, $duration_ms:expr, $ignored:expr) => {
        ::tracing::info!(
            target: "stepwise::step",
            event_type = "step.completed",
            name = %$name,
            success = $success,
            exit_code = ?$exit_code,
            duration_ms = $duration_ms,
            ignored = $ignored,
        )
    };
}

// Cache events

/// Emit an exact cache hit.
#[macro_export]
macro_rules! emit_cache_hit {
    ($key:expr) => {
        ::tracing::info!(
            target: "stepwise::cache",
            event_type = "cache.hit",
            key = %$key,
        )
    };
}

/// Emit a partial cache hit through a restore key.
#[macro_export]
macro_rules! emit_cache_restored {
    ($key:expr, $matched_key:expr) => {
        ::tracing::info!(
            target: "stepwise::cache",
            event_type = "cache.restored",
            key = %$key,
            matched_key = %$matched_key,
        )
    };
}

/// Emit a cache miss.
#[macro_export]
macro_rules! emit_cache_miss {
    ($key:expr) => {
        ::tracing::info!(
            target: "stepwise::cache",
            event_type = "cache.miss",
            key = %$key,
        )
    };
}

/// Emit a cache save.
#[macro_export]
macro_rules! emit_cache_saved {
    ($key:expr, $size_bytes:expr) => {
        ::tracing::info!(
            target: "stepwise::cache",
            event_type = "cache.saved",
            key = %$key,
            size_bytes = $size_bytes,
        )
    };
}

/// Emit a cache backend failure that was degraded to a miss.
#[macro_export]
macro_rules! emit_cache_unavailable {
    ($key:expr, $error:expr) => {
        ::tracing::warn!(
            target: "stepwise::cache",
            event_type = "cache.unavailable",
            key = %$key,
            error = %$error,
        )
    };
}

// Output and system events

/// Emit a stdout output event.
#[macro_export]
macro_rules! emit_stdout {
    ($content:expr) => {
        ::tracing::info!(
            target: "stepwise::output",
            event_type = "output.stdout",
            content = %$content,
        )
    };
}

/// Emit a stderr output event.
#[macro_export]
macro_rules! emit_stderr {
    ($content:expr) => {
        ::tracing::info!(
            target: "stepwise::output",
            event_type = "output.stderr",
            content = %$content,
        )
    };
}

/// Emit the terminal shutdown event; renderers stop after it.
#[macro_export]
macro_rules! emit_shutdown {
    () => {
        ::tracing::info!(target: "stepwise::system", event_type = "system.shutdown")
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tracing_subscriber::layer::SubscriberExt;

    fn collect(f: impl FnOnce()) -> Vec<StepwiseEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(StepwiseEventLayer::new(tx));
        tracing::subscriber::with_default(subscriber, f);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_pipeline_and_step_macros() {
        let events = collect(|| {
            emit_pipeline_started!("build", "push", 2_usize);
            emit_step_started!("Install dependencies", "pip install flake8 pytest");
            emit_step_output!("Install dependencies", Stream::Stderr, "WARNING: pip is old");
            emit_step_skipped!("Install dependencies", "steps.cache.outputs.cache-hit != 'true'");
            emit_step_completed!("Lint", true, Some(0), 10_u64, false);
            emit_pipeline_not_triggered!("build", "branch docs is not in [main]");
            emit_pipeline_completed!("build", true, 99_u64);
        });

        assert_eq!(events.len(), 7);
        assert!(matches!(
            &events[0].category,
            EventCategory::Pipeline(PipelineEvent::Started { step_count: 2, trigger, .. }) if trigger == "push"
        ));
        assert!(matches!(
            &events[2].category,
            EventCategory::Step(StepEvent::Output { stream: Stream::Stderr, content, .. }) if content == "WARNING: pip is old"
        ));
        assert!(matches!(
            &events[3].category,
            EventCategory::Step(StepEvent::Skipped { condition, .. }) if condition.contains("cache-hit")
        ));
        assert!(matches!(
            &events[5].category,
            EventCategory::Pipeline(PipelineEvent::NotTriggered { .. })
        ));
    }

    #[test]
    fn test_cache_and_system_macros() {
        let events = collect(|| {
            emit_cache_hit!("k");
            emit_cache_miss!("k");
            emit_cache_unavailable!("k", "permission denied");
            emit_stdout!("hello");
            emit_stderr!("oops");
            emit_shutdown!();
        });

        assert_eq!(events.len(), 6);
        assert!(matches!(
            &events[2].category,
            EventCategory::Cache(CacheEvent::Unavailable { error, .. }) if error == "permission denied"
        ));
        assert!(events[5].is_shutdown());
        assert!(events.iter().all(|e| e.target.starts_with(EVENT_TARGET_PREFIX)));
    }
}
