//! CLI renderer for stepwise events.
//!
//! Step output is forwarded to stdout/stderr as it arrives; lifecycle events
//! are rendered as `>`-prefixed status lines on stderr, mirroring the way a
//! hosted CI log groups output under each step.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use crate::channel::EventReceiver;
use crate::event::{
    CacheEvent, EventCategory, OutputEvent, PipelineEvent, StepEvent, StepwiseEvent, Stream,
    SystemEvent,
};
use std::io::{self, IsTerminal, Write};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// CLI renderer configuration.
#[derive(Debug, Clone)]
pub struct CliRendererConfig {
    /// Whether to use ANSI colors.
    pub colors: bool,
    /// Whether to show verbose output (durations, cache misses).
    pub verbose: bool,
}

impl Default for CliRendererConfig {
    fn default() -> Self {
        Self {
            colors: io::stderr().is_terminal(),
            verbose: false,
        }
    }
}

/// CLI renderer that outputs events to stdout/stderr.
#[derive(Debug)]
pub struct CliRenderer {
    config: CliRendererConfig,
}

impl CliRenderer {
    /// Create a new CLI renderer with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CliRendererConfig::default(),
        }
    }

    /// Create a new CLI renderer with the given configuration.
    #[must_use]
    pub const fn with_config(config: CliRendererConfig) -> Self {
        Self { config }
    }

    /// Consume events until the run shuts down.
    pub async fn run(self, mut receiver: EventReceiver) {
        while let Some(event) = receiver.recv().await {
            if event.is_shutdown() {
                break;
            }
            self.render(&event);
        }
        let _ = io::stdout().flush();
    }

    /// Render a single event.
    pub fn render(&self, event: &StepwiseEvent) {
        if let Some(line) = self.format(event) {
            eprintln!("{line}");
            return;
        }
        match &event.category {
            EventCategory::Step(StepEvent::Output {
                stream, content, ..
            }) => match stream {
                Stream::Stdout => println!("{content}"),
                Stream::Stderr => eprintln!("{content}"),
            },
            EventCategory::Output(OutputEvent::Stdout { content }) => println!("{content}"),
            EventCategory::Output(OutputEvent::Stderr { content }) => eprintln!("{content}"),
            _ => {}
        }
    }

    /// Status line for lifecycle events; `None` for output and silent events.
    #[must_use]
    pub fn format(&self, event: &StepwiseEvent) -> Option<String> {
        match &event.category {
            EventCategory::Pipeline(pipeline) => Some(self.format_pipeline(pipeline)),
            EventCategory::Step(step) => self.format_step(step),
            EventCategory::Cache(cache) => self.format_cache(cache),
            EventCategory::Output(_) | EventCategory::System(SystemEvent::Shutdown) => None,
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.config.colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn format_pipeline(&self, event: &PipelineEvent) -> String {
        match event {
            PipelineEvent::Started {
                name,
                trigger,
                step_count,
            } => format!("> Running {name} on {trigger} ({step_count} steps)"),
            PipelineEvent::NotTriggered { name, reason } => {
                self.paint(DIM, &format!("> {name} not triggered: {reason}"))
            }
            PipelineEvent::Completed {
                name,
                success,
                duration_ms,
            } => {
                if *success {
                    self.paint(GREEN, &format!("> {name} succeeded in {duration_ms}ms"))
                } else {
                    self.paint(RED, &format!("> {name} failed after {duration_ms}ms"))
                }
            }
        }
    }

    fn format_step(&self, event: &StepEvent) -> Option<String> {
        match event {
            StepEvent::Started { name, command } => {
                if self.config.verbose && !command.is_empty() {
                    Some(format!("> [{name}] {command}"))
                } else {
                    Some(format!("> [{name}]"))
                }
            }
            StepEvent::Skipped { name, condition } => Some(
                self.paint(DIM, &format!("> [{name}] skipped (if: {condition})")),
            ),
            StepEvent::Output { .. } => None,
            StepEvent::Completed {
                name,
                success,
                exit_code,
                duration_ms,
                ignored,
            } => {
                let code = exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default();
                if *success {
                    self.config
                        .verbose
                        .then(|| self.paint(GREEN, &format!("> [{name}] passed in {duration_ms}ms")))
                } else if *ignored {
                    Some(self.paint(
                        YELLOW,
                        &format!("> [{name}] failed{code}, continuing (continue-on-error)"),
                    ))
                } else {
                    Some(self.paint(RED, &format!("> [{name}] failed{code}")))
                }
            }
        }
    }

    fn format_cache(&self, event: &CacheEvent) -> Option<String> {
        match event {
            CacheEvent::Hit { key } => Some(format!("> Cache restored from key: {key}")),
            CacheEvent::Restored { matched_key, .. } => {
                Some(format!("> Cache restored from key: {matched_key}"))
            }
            CacheEvent::Miss { key } => Some(format!("> Cache not found for input keys: {key}")),
            CacheEvent::Saved { key, size_bytes } => Some(if self.config.verbose {
                format!("> Cache saved with key: {key} ({size_bytes} bytes)")
            } else {
                format!("> Cache saved with key: {key}")
            }),
            CacheEvent::Unavailable { key, error } => Some(self.paint(
                YELLOW,
                &format!("> Cache unavailable for {key}: {error}"),
            )),
        }
    }
}

impl Default for CliRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(category: EventCategory) -> StepwiseEvent {
        StepwiseEvent::new(Uuid::new_v4(), "stepwise::test", category)
    }

    fn plain(verbose: bool) -> CliRenderer {
        CliRenderer::with_config(CliRendererConfig {
            colors: false,
            verbose,
        })
    }

    #[test]
    fn test_config_default_not_verbose() {
        assert!(!CliRendererConfig::default().verbose);
    }

    #[test]
    fn test_format_step_started() {
        let e = event(EventCategory::Step(StepEvent::Started {
            name: "Lint with flake8".to_string(),
            command: "flake8 .".to_string(),
        }));
        assert_eq!(plain(false).format(&e).unwrap(), "> [Lint with flake8]");
        assert_eq!(
            plain(true).format(&e).unwrap(),
            "> [Lint with flake8] flake8 ."
        );
    }

    #[test]
    fn test_format_ignored_failure() {
        let e = event(EventCategory::Step(StepEvent::Completed {
            name: "flake8 warnings".to_string(),
            success: false,
            exit_code: Some(1),
            duration_ms: 10,
            ignored: true,
        }));
        let line = plain(false).format(&e).unwrap();
        assert!(line.contains("continue-on-error"));
        assert!(line.contains("exit code 1"));
    }

    #[test]
    fn test_success_is_quiet_unless_verbose() {
        let e = event(EventCategory::Step(StepEvent::Completed {
            name: "pytest".to_string(),
            success: true,
            exit_code: Some(0),
            duration_ms: 10,
            ignored: false,
        }));
        assert!(plain(false).format(&e).is_none());
        assert!(plain(true).format(&e).is_some());
    }

    #[test]
    fn test_colors_applied() {
        let renderer = CliRenderer::with_config(CliRendererConfig {
            colors: true,
            verbose: false,
        });
        let e = event(EventCategory::Pipeline(PipelineEvent::Completed {
            name: "build".to_string(),
            success: false,
            duration_ms: 5,
        }));
        let line = renderer.format(&e).unwrap();
        assert!(line.starts_with(RED));
        assert!(line.ends_with(RESET));
    }

    #[test]
    fn test_format_cache_partial_hit_names_matched_key() {
        let e = event(EventCategory::Cache(CacheEvent::Restored {
            key: "Linux-pip-v0-new".to_string(),
            matched_key: "Linux-pip-v0-old".to_string(),
        }));
        assert_eq!(
            plain(false).format(&e).unwrap(),
            "> Cache restored from key: Linux-pip-v0-old"
        );
    }

    #[test]
    fn test_output_has_no_status_line() {
        let e = event(EventCategory::Step(StepEvent::Output {
            name: "pytest".to_string(),
            stream: Stream::Stdout,
            content: "collected 3 items".to_string(),
        }));
        assert!(plain(false).format(&e).is_none());
        plain(false).render(&e);
    }
}
