use super::{RunResult, RunStatus, StepStatus, WorkflowReport};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

/// Lines of a failing step's output included in the summary.
const OUTPUT_TAIL_LINES: usize = 50;

/// Generate a markdown summary of the workflow report.
///
/// Written to `GITHUB_STEP_SUMMARY` when running under GitHub Actions.
#[must_use]
pub fn generate_summary(report: &WorkflowReport) -> String {
    let mut md = String::new();

    let _ = writeln!(
        md,
        "## {} {}: {}\n",
        status_emoji(report.status),
        report.workflow,
        report.status
    );

    md.push_str("| Job | Status | Duration |\n");
    md.push_str("|-----|--------|----------|\n");
    for run in &report.runs {
        let _ = writeln!(
            md,
            "| `{}` | {} {} | {} |",
            run.job_name,
            status_emoji(run.status),
            run.status,
            format_duration(run.duration_ms)
        );
    }
    md.push('\n');

    for run in report.runs.iter().filter(|r| !r.steps.is_empty()) {
        write_run(&mut md, run);
    }

    md.push_str("### Details\n\n");
    let sha = &report.context.sha;
    if !sha.is_empty() {
        let short: String = sha.chars().take(8).collect();
        let _ = writeln!(md, "- **Commit:** `{short}`");
    }
    let _ = writeln!(
        md,
        "- **Trigger:** {} to `{}`",
        report.context.event, report.context.branch
    );
    let _ = writeln!(md, "- **Duration:** {}", format_duration(report.duration_ms));

    md
}

fn write_run(md: &mut String, run: &RunResult) {
    let _ = writeln!(md, "### {}\n", run.job_name);
    md.push_str("| Step | Status | Duration |\n");
    md.push_str("|------|--------|----------|\n");
    for step in &run.steps {
        let _ = writeln!(
            md,
            "| {} | {} {} | {} |",
            step.name.replace('|', "\\|"),
            step.status.icon(),
            step.status,
            format_duration(step.duration_ms)
        );
    }
    md.push('\n');

    if let Some(step) = run.failed_step() {
        let _ = writeln!(md, "**First failure:** {}", step.name);
        if let Some(error) = &step.error {
            let _ = writeln!(md, "\n> {error}");
        }
        if let Some(output) = step.output.as_deref().filter(|o| !o.trim().is_empty()) {
            let lines: Vec<&str> = output.lines().collect();
            let tail = &lines[lines.len().saturating_sub(OUTPUT_TAIL_LINES)..];
            md.push_str("\n```text\n");
            for line in tail {
                md.push_str(line);
                md.push('\n');
            }
            md.push_str("```\n");
        }
        md.push('\n');
    }

    let ignored = run.count(StepStatus::FailedIgnored);
    if ignored > 0 {
        let _ = writeln!(md, "_{ignored} advisory step(s) failed without failing the run._\n");
    }
}

const fn status_emoji(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "✅",
        RunStatus::Failed => "❌",
        RunStatus::Cancelled => "⚠️",
        RunStatus::NotTriggered | RunStatus::Skipped => "⏭️",
    }
}

/// Append the summary to `path` (the `GITHUB_STEP_SUMMARY` file).
///
/// # Errors
/// Returns error if the file cannot be opened or written
pub fn append_summary(path: &Path, report: &WorkflowReport) -> stepwise_core::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| stepwise_core::Error::io(e, path, "open_summary"))?;
    file.write_all(generate_summary(report).as_bytes())
        .map_err(|e| stepwise_core::Error::io(e, path, "write_summary"))?;
    Ok(())
}

/// Format duration in milliseconds to a human-readable string.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}
