//! `stepwise run`

use super::{Outcome, data_dirs, resolve_workspace, workflow_path};
use crate::cli::{CliError, OkEnvelope, RunArgs, SelectArgs};
use std::path::Path;
use stepwise_ci::provider::CIProvider;
use stepwise_ci::report::{json, markdown, terminal};
use stepwise_ci::{
    CIContext, CompileOptions, ExecutorConfig, Pipeline, PipelineExecutor, RunStatus,
    Workflow, WorkflowReport, compile_workflow,
};
use stepwise_core::config::{CachePolicy, Config};
use tokio_util::sync::CancellationToken;

/// Load and compile the selected workflow.
pub(crate) fn load_pipelines(
    select: &SelectArgs,
    config: &Config,
    workspace: &Path,
) -> Result<Vec<Pipeline>, CliError> {
    let path = workflow_path(select, config, workspace);
    if !path.is_file() {
        return Err(CliError::config_with_help(
            format!("Workflow {} not found", path.display()),
            "Pass --workflow, or run 'stepwise init' to write the Python package workflow",
        ));
    }
    let workflow = Workflow::from_path(&path)?;

    let mut options = CompileOptions::default();
    if let Some(job) = &select.job {
        options = options.with_job(job);
    }
    for (key, value) in &select.matrix {
        options = options.with_matrix(key, value);
    }
    Ok(compile_workflow(&workflow, &options)?)
}

/// Detected context with `--event` and `--branch` applied.
pub(crate) fn trigger_context(provider: &dyn CIProvider, select: &SelectArgs) -> CIContext {
    let mut context = provider.context().clone();
    if let Some(event) = select.event {
        context.trigger.kind = event.into();
    }
    if let Some(branch) = &select.branch {
        context.trigger.branch.clone_from(branch);
        context.head_ref = None;
    }
    context
}

fn executor_config(args: &RunArgs, config: &Config, workspace: &Path) -> Result<ExecutorConfig, CliError> {
    let dirs = data_dirs(args.cache_dir.as_deref(), config)?;
    let policy = args
        .cache_policy
        .map(CachePolicy::from)
        .or_else(|| config.cache_policy())
        .unwrap_or_default();

    let mut executor = ExecutorConfig::new(workspace)
        .with_cache_root(dirs.deps)
        .with_toolcache_root(dirs.toolcache)
        .with_cache_policy(policy)
        .with_force(args.force);
    if let Some(shell) = config.shell() {
        executor = executor.with_default_shell(shell);
    }
    if let Some(fail_fast) = config.fail_fast() {
        executor = executor.with_fail_fast(fail_fast);
    }
    for (key, value) in config.env() {
        executor = executor.with_env(key, value);
    }
    Ok(executor)
}

/// One line naming why the invocation did not succeed.
fn failure_message(report: &WorkflowReport) -> String {
    if report.status == RunStatus::Cancelled {
        return "Run cancelled".to_string();
    }
    report
        .runs
        .iter()
        .find_map(|run| {
            run.failed_step().map(|step| {
                let detail = step
                    .error
                    .clone()
                    .or_else(|| step.exit_code.map(|code| format!("exit code {code}")))
                    .unwrap_or_else(|| "failed".to_string());
                format!("{}: step '{}' failed ({detail})", run.job_name, step.name)
            })
        })
        .unwrap_or_else(|| format!("{} {}", report.workflow, report.status))
}

/// Run the selected pipelines.
///
/// # Errors
///
/// Returns an error when the workspace, configuration or workflow is invalid,
/// or when reports cannot be written. Step failures are reported through
/// [`Outcome::failure`].
pub async fn execute(
    args: &RunArgs,
    json_mode: bool,
    cancel: CancellationToken,
) -> Result<Outcome, CliError> {
    let workspace = resolve_workspace(args.select.workspace.as_deref())?;
    let config = Config::load(&workspace)?;
    let pipelines = load_pipelines(&args.select, &config, &workspace)?;

    let provider = stepwise_ci::provider::detect(&workspace);
    let context = trigger_context(provider.as_ref(), &args.select);
    tracing::info!(%context, pipelines = pipelines.len(), "Starting run");

    let executor = PipelineExecutor::new(executor_config(args, &config, &workspace)?)
        .map_err(stepwise_core::Error::from)?
        .with_cancellation(cancel);
    let report = executor
        .execute_workflow(&pipelines, &context)
        .await
        .map_err(stepwise_core::Error::from)?;

    if let Some(path) = &args.report {
        json::write_report(&report, path)?;
        tracing::debug!(path = %path.display(), "Wrote JSON report");
    }
    if let Some(path) = provider.summary_path() {
        markdown::append_summary(&path, &report)?;
    }

    let output = if json_mode {
        serde_json::to_string_pretty(&OkEnvelope::new(&report))
            .map_err(|e| CliError::other(format!("Failed to serialize report: {e}")))?
    } else {
        terminal::format_summary(&report)
    };

    let failure = matches!(report.status, RunStatus::Failed | RunStatus::Cancelled)
        .then(|| CliError::failed(failure_message(&report), report.status));
    Ok(Outcome {
        output: Some(output),
        failure,
    })
}
