//! Plain-text renderings for the terminal: the end-of-run summary and the
//! `plan` listing.

use super::markdown::format_duration;
use super::{RunStatus, StepStatus, WorkflowReport};
use crate::pipeline::{Pipeline, StepAction};
use std::fmt::Write as _;

/// Summary printed after a run.
#[must_use]
pub fn format_summary(report: &WorkflowReport) -> String {
    let mut out = String::new();
    for run in &report.runs {
        let _ = writeln!(out, "{} [{}]", run.job_name, run.status);
        if let Some(reason) = &run.reason {
            let _ = writeln!(out, "  {reason}");
        }
        for step in &run.steps {
            let duration = if matches!(step.status, StepStatus::Success | StepStatus::Failed | StepStatus::FailedIgnored) {
                format!(" ({})", format_duration(step.duration_ms))
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "  {} {}{}{}",
                step.status.icon(),
                step.name,
                match step.status {
                    StepStatus::Success => String::new(),
                    other => format!(" [{other}]"),
                },
                duration
            );
        }
        if let Some(step) = run.failed_step() {
            let detail = step
                .error
                .clone()
                .or_else(|| step.exit_code.map(|code| format!("exit code {code}")))
                .unwrap_or_default();
            let _ = writeln!(out, "  first failure: {} ({detail})", step.name);
        }
    }

    let verdict = match report.status {
        RunStatus::Success => "passed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
        RunStatus::NotTriggered => "not triggered",
        RunStatus::Skipped => "skipped",
    };
    let _ = write!(
        out,
        "{}: {verdict} in {}",
        report.workflow,
        format_duration(report.duration_ms)
    );
    out
}

/// Listing printed by `stepwise plan`.
#[must_use]
pub fn format_plan(pipelines: &[Pipeline]) -> String {
    let mut out = String::new();
    for pipeline in pipelines {
        let _ = writeln!(
            out,
            "{} / {} (runs-on: {})",
            pipeline.workflow, pipeline.job_name, pipeline.runs_on
        );
        for step in &pipeline.steps {
            let mut flags = Vec::new();
            if let Some(condition) = &step.condition {
                flags.push(format!("if: {}", condition.source()));
            }
            if step.continue_on_error {
                flags.push("continue-on-error".to_string());
            }
            if let Some(minutes) = step.timeout_minutes {
                flags.push(format!("timeout: {minutes}m"));
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            };
            let _ = writeln!(out, "  {:>2}. {}{flags}", step.index + 1, step.display_name());

            match &step.action {
                StepAction::Run { script, .. } => {
                    for line in script.source().lines().filter(|l| !l.trim().is_empty()) {
                        let _ = writeln!(out, "        $ {}", line.trim_end());
                    }
                }
                StepAction::Uses { action, with } => {
                    let _ = writeln!(out, "        uses {action}");
                    for (key, value) in with {
                        let _ = writeln!(out, "          {key}: {}", value.source());
                    }
                }
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CompileOptions, compile_workflow};
    use crate::report::{ContextReport, RunResult, StepReport};
    use crate::workflow::Workflow;
    use chrono::Utc;
    use indexmap::IndexMap;

    #[test]
    fn test_format_summary_reports_first_failure() {
        let report = WorkflowReport {
            version: "1".to_string(),
            workflow: "ci".to_string(),
            context: ContextReport {
                provider: "local".to_string(),
                event: "push".to_string(),
                branch: "main".to_string(),
                sha: String::new(),
            },
            started_at: Utc::now(),
            duration_ms: 1200,
            status: RunStatus::Failed,
            runs: vec![RunResult {
                job_id: "build".to_string(),
                job_name: "build".to_string(),
                matrix: IndexMap::new(),
                status: RunStatus::Failed,
                reason: None,
                first_failure: Some(0),
                steps: vec![
                    StepReport {
                        exit_code: Some(1),
                        ..StepReport::not_executed(0, None, "black", "black --check .", StepStatus::Failed)
                    },
                    StepReport::not_executed(1, None, "pytest", "pytest", StepStatus::NotRun),
                ],
                started_at: Utc::now(),
                duration_ms: 1200,
            }],
        };
        let text = format_summary(&report);
        assert!(text.contains("build [failed]"));
        assert!(text.contains("pytest [not run]"));
        assert!(text.contains("first failure: black (exit code 1)"));
        assert!(text.ends_with("ci: failed in 1.2s"));
    }

    #[test]
    fn test_format_plan() {
        let workflow = Workflow::from_yaml_str(
            r"
name: ci
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - name: Lint
        run: flake8 . --exit-zero
        continue-on-error: true
",
            "ci.yml",
        )
        .unwrap();
        let pipelines = compile_workflow(&workflow, &CompileOptions::default()).unwrap();
        let plan = format_plan(&pipelines);
        assert!(plan.starts_with("ci / build (runs-on: ubuntu-latest)"));
        assert!(plan.contains(" 1. Run actions/checkout@v4"));
        assert!(plan.contains("uses actions/checkout@v4"));
        assert!(plan.contains(" 2. Lint  [continue-on-error]"));
        assert!(plan.contains("$ flake8 . --exit-zero"));
    }
}
