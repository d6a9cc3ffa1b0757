//! Sequential Execution Engine
//!
//! Runs the steps of one pipeline in declared order and the pipelines of a
//! workflow one after another, honoring `fail-fast` between matrix
//! combinations of a job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use stepwise_core::config::CachePolicy;
use stepwise_events::{
    Stream, emit_pipeline_completed, emit_pipeline_not_triggered, emit_pipeline_started,
    emit_step_completed, emit_step_output, emit_step_skipped, emit_step_started,
};
use tokio_util::sync::CancellationToken;

use super::ExecutorError;
use super::commands::{FileCommandOutput, FileCommands};
use super::config::ExecutorConfig;
use super::runner::{CommandRunner, CommandSpec, ProcessRunner};
use super::shell::Shell;
use crate::actions::{self, ActionContext, ActionOutcome, PostAction};
use crate::cache::{CacheBackend, LocalCacheBackend};
use crate::context::CIContext;
use crate::expr::{EvalContext, JobStatus, Template, Value};
use crate::pipeline::{Pipeline, Step, StepAction};
use crate::report::{
    REPORT_VERSION, RunResult, RunStatus, StepReport, StepStatus, WorkflowReport,
};

/// Executes pipelines.
pub struct PipelineExecutor {
    config: ExecutorConfig,
    runner: Arc<dyn CommandRunner>,
    cache: Option<Arc<dyn CacheBackend>>,
    cancel: CancellationToken,
}

impl PipelineExecutor {
    /// Create an executor running steps as child processes, with the local
    /// cache backend unless the policy disables caching.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be determined
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        let cache: Option<Arc<dyn CacheBackend>> = if config.cache_policy == CachePolicy::Disabled {
            None
        } else {
            Some(Arc::new(LocalCacheBackend::new(config.effective_cache_root()?)))
        };
        Ok(Self {
            config,
            runner: Arc::new(ProcessRunner),
            cache,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the command runner
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the cache backend
    #[must_use]
    pub fn with_cache(mut self, cache: Option<Arc<dyn CacheBackend>>) -> Self {
        self.cache = cache;
        self
    }

    /// Use `token` for cancellation
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Executor configuration
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every pipeline in order.
    ///
    /// A failed combination stops the remaining combinations of the same job
    /// when fail-fast applies; cancellation stops everything.
    ///
    /// # Errors
    /// Returns error if the workspace or runner directory is unusable
    #[tracing::instrument(
        name = "execute_workflow",
        fields(pipelines = pipelines.len(), trigger = %ctx.trigger),
        skip(self, pipelines, ctx)
    )]
    pub async fn execute_workflow(
        &self,
        pipelines: &[Pipeline],
        ctx: &CIContext,
    ) -> Result<WorkflowReport, ExecutorError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut runs = Vec::with_capacity(pipelines.len());
        let mut failed_jobs: Vec<&str> = Vec::new();
        let mut cancelled = false;

        for pipeline in pipelines {
            let halted_by = if cancelled {
                Some("run cancelled".to_string())
            } else if failed_jobs.contains(&pipeline.job_id.as_str()) {
                Some(format!("fail-fast: an earlier {} combination failed", pipeline.job_id))
            } else {
                None
            };
            if let Some(reason) = halted_by {
                tracing::info!(job = %pipeline.job_name, %reason, "Skipping pipeline");
                runs.push(RunResult::not_started(
                    &pipeline.job_id,
                    &pipeline.job_name,
                    pipeline.matrix.clone(),
                    RunStatus::Skipped,
                    reason,
                ));
                continue;
            }

            let result = self.execute(pipeline, ctx).await?;
            match result.status {
                RunStatus::Cancelled => cancelled = true,
                RunStatus::Failed if self.config.fail_fast.unwrap_or(pipeline.fail_fast) => {
                    failed_jobs.push(&pipeline.job_id);
                }
                _ => {}
            }
            runs.push(result);
        }

        let status = WorkflowReport::aggregate(&runs);
        Ok(WorkflowReport {
            version: REPORT_VERSION.to_string(),
            workflow: pipelines
                .first()
                .map_or_else(|| "workflow".to_string(), |p| p.workflow.clone()),
            context: ctx.into(),
            started_at,
            duration_ms: elapsed_ms(start),
            status,
            runs,
        })
    }

    /// Run one pipeline.
    ///
    /// # Errors
    /// Returns error if the workspace or runner directory is unusable; step
    /// failures are reported in the result
    #[tracing::instrument(
        name = "execute_pipeline",
        fields(job = %pipeline.job_name, steps = pipeline.steps.len()),
        skip(self, pipeline, ctx)
    )]
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        ctx: &CIContext,
    ) -> Result<RunResult, ExecutorError> {
        if !self.config.force
            && let Some(reason) = pipeline.triggers.mismatch_reason(&ctx.trigger)
        {
            emit_pipeline_not_triggered!(pipeline.job_name, reason);
            return Ok(RunResult::not_started(
                &pipeline.job_id,
                &pipeline.job_name,
                pipeline.matrix.clone(),
                RunStatus::NotTriggered,
                reason,
            ));
        }

        if !self.config.workspace.is_dir() {
            return Err(ExecutorError::Workspace {
                path: self.config.workspace.clone(),
            });
        }
        let toolcache = self.config.effective_toolcache_root()?;
        let temp = self.runner_dir()?;

        emit_pipeline_started!(pipeline.job_name, ctx.trigger, pipeline.steps.len());
        let started_at = Utc::now();
        let start = Instant::now();

        let mut run = Run {
            executor: self,
            pipeline,
            ci: ctx,
            temp: temp.path(),
            toolcache: &toolcache,
            env: self.config.env.clone(),
            path: Vec::new(),
            steps: Value::object(),
            posts: Vec::new(),
        };

        let mut reports = Vec::with_capacity(pipeline.steps.len());
        let mut first_failure = None;
        let mut status = RunStatus::Success;

        if let Err(message) = run.render_job_env() {
            tracing::error!(job = %pipeline.job_name, %message, "Invalid job environment");
            status = RunStatus::Failed;
            first_failure = Some(0);
            reports.push(StepReport {
                error: Some(message),
                ..StepReport::not_executed(0, None, "Set up job", "env", StepStatus::Failed)
            });
        }

        for step in &pipeline.steps {
            if status != RunStatus::Success {
                reports.push(not_run(step, StepStatus::NotRun));
                continue;
            }
            if self.cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                reports.push(not_run(step, StepStatus::NotRun));
                continue;
            }

            let report = run.execute_step(step).await;
            match report.status {
                StepStatus::Success => run.save_pending(step.index).await,
                StepStatus::Failed => {
                    status = RunStatus::Failed;
                    first_failure = Some(reports.len());
                }
                StepStatus::Cancelled => status = RunStatus::Cancelled,
                _ => {}
            }
            reports.push(report);
        }

        run.post_steps(status).await;

        let duration_ms = elapsed_ms(start);
        emit_pipeline_completed!(pipeline.job_name, status == RunStatus::Success, duration_ms);

        Ok(RunResult {
            job_id: pipeline.job_id.clone(),
            job_name: pipeline.job_name.clone(),
            matrix: pipeline.matrix.clone(),
            status,
            reason: None,
            first_failure,
            steps: reports,
            started_at,
            duration_ms,
        })
    }

    fn runner_dir(&self) -> Result<tempfile::TempDir, ExecutorError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("stepwise-run-");
        let dir = match &self.config.temp_root {
            Some(root) => std::fs::create_dir_all(root).and_then(|()| builder.tempdir_in(root)),
            None => builder.tempdir(),
        };
        dir.map_err(|source| ExecutorError::RunnerDirectory { source })
    }
}

fn not_run(step: &Step, status: StepStatus) -> StepReport {
    StepReport::not_executed(
        step.index,
        step.id.clone(),
        step.display_name(),
        step.command(),
        status,
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn runner_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        other => other,
    }
}

fn runner_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "X64",
        "x86" => "X86",
        "aarch64" => "ARM64",
        "arm" => "ARM",
        other => other,
    }
}

/// What running a step produced.
#[derive(Debug, Default)]
struct Execution {
    success: bool,
    cancelled: bool,
    exit_code: Option<i32>,
    error: Option<String>,
    output: String,
    outputs: IndexMap<String, String>,
}

impl Execution {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn cancelled() -> Self {
        Self {
            cancelled: true,
            error: Some("cancelled".to_string()),
            ..Self::default()
        }
    }
}

/// State of one pipeline run.
struct Run<'a> {
    executor: &'a PipelineExecutor,
    pipeline: &'a Pipeline,
    ci: &'a CIContext,
    temp: &'a Path,
    toolcache: &'a Path,
    /// Job environment plus everything exported by earlier steps
    env: IndexMap<String, String>,
    /// `PATH` additions, most recent first
    path: Vec<PathBuf>,
    /// `steps` context
    steps: Value,
    /// Post-run work keyed by the index of the step that registered it
    posts: Vec<(usize, PostAction)>,
}

impl Run<'_> {
    fn workspace(&self) -> &Path {
        &self.executor.config.workspace
    }

    fn contexts(&self, env: &IndexMap<String, String>) -> Value {
        let ci = self.ci;
        let mut contexts = Value::object();

        let mut github = Value::string_object([
            ("event_name", ci.trigger.kind.as_str().to_string()),
            ("ref", ci.git_ref()),
            ("ref_name", ci.trigger.branch.clone()),
            ("sha", ci.sha.clone()),
            ("repository", ci.repository.clone().unwrap_or_default()),
            ("base_ref", ci.base_ref.clone().unwrap_or_default()),
            ("head_ref", ci.head_ref.clone().unwrap_or_default()),
            ("workspace", self.workspace().display().to_string()),
            ("job", self.pipeline.job_id.clone()),
            ("workflow", self.pipeline.workflow.clone()),
        ]);
        github.insert("event", Value::object());
        contexts.insert("github", github);

        contexts.insert(
            "env",
            Value::string_object(env.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        );
        contexts.insert(
            "matrix",
            Value::string_object(
                self.pipeline
                    .matrix
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            ),
        );
        contexts.insert("steps", self.steps.clone());
        contexts.insert(
            "runner",
            Value::string_object([
                ("os", runner_os().to_string()),
                ("arch", runner_arch().to_string()),
                ("name", "stepwise".to_string()),
                ("temp", self.temp.display().to_string()),
                ("tool_cache", self.toolcache.display().to_string()),
            ]),
        );
        contexts.insert("job", Value::string_object([("status", "success")]));
        let mut strategy = Value::object();
        strategy.insert(
            "fail-fast",
            Value::Bool(
                self.executor
                    .config
                    .fail_fast
                    .unwrap_or(self.pipeline.fail_fast),
            ),
        );
        contexts.insert("strategy", strategy);
        for empty in ["inputs", "vars", "secrets"] {
            contexts.insert(empty, Value::object());
        }
        contexts
    }

    fn render_job_env(&mut self) -> Result<(), String> {
        let pipeline = self.pipeline;
        for (key, template) in &pipeline.env {
            let contexts = self.contexts(&self.env);
            let eval = EvalContext::new(&contexts, self.workspace());
            let value = template
                .render(&eval)
                .map_err(|e| format!("env.{key}: {e}"))?;
            self.env.insert(key.clone(), value);
        }
        Ok(())
    }

    fn render(&self, template: &Template, contexts: &Value) -> Result<String, String> {
        template
            .render(&EvalContext::new(contexts, self.workspace()).with_status(JobStatus::Success))
            .map_err(|e| format!("{}: {e}", template.source()))
    }

    /// Variables set on the child process.
    fn process_env(&self, step_env: &IndexMap<String, String>) -> IndexMap<String, String> {
        let ci = self.ci;
        let mut env: IndexMap<String, String> = [
            ("CI", "true".to_string()),
            ("GITHUB_WORKSPACE", self.workspace().display().to_string()),
            ("GITHUB_EVENT_NAME", ci.trigger.kind.as_str().to_string()),
            ("GITHUB_REF", ci.git_ref()),
            ("GITHUB_REF_NAME", ci.trigger.branch.clone()),
            ("GITHUB_SHA", ci.sha.clone()),
            ("GITHUB_JOB", self.pipeline.job_id.clone()),
            ("GITHUB_WORKFLOW", self.pipeline.workflow.clone()),
            ("RUNNER_OS", runner_os().to_string()),
            ("RUNNER_ARCH", runner_arch().to_string()),
            ("RUNNER_TEMP", self.temp.display().to_string()),
            ("RUNNER_TOOL_CACHE", self.toolcache.display().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        if let Some(repository) = &ci.repository {
            env.insert("GITHUB_REPOSITORY".to_string(), repository.clone());
        }
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(step_env.iter().map(|(k, v)| (k.clone(), v.clone())));

        if !self.path.is_empty() {
            let base = env
                .get("PATH")
                .cloned()
                .or_else(|| std::env::var("PATH").ok())
                .unwrap_or_default();
            let entries = self
                .path
                .iter()
                .cloned()
                .chain(std::env::split_paths(&base));
            match std::env::join_paths(entries) {
                Ok(joined) => {
                    env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
                }
                Err(error) => tracing::warn!(%error, "Cannot extend PATH"),
            }
        }
        env
    }

    fn prepend_paths(&mut self, paths: Vec<PathBuf>) {
        for path in paths {
            self.path.retain(|existing| existing != &path);
            self.path.insert(0, path);
        }
    }

    #[tracing::instrument(
        name = "execute_step",
        fields(index = step.index, id = ?step.id),
        skip(self, step)
    )]
    async fn execute_step(&mut self, step: &Step) -> StepReport {
        let base = self.contexts(&self.env);
        let name = self
            .render(&step.name, &base)
            .unwrap_or_else(|_| step.display_name().to_string());

        let should_run = match &step.condition {
            None => Ok(true),
            Some(condition) => condition
                .evaluate(&EvalContext::new(&base, self.workspace()).with_status(JobStatus::Success))
                .map_err(|e| format!("if: {e}")),
        };
        let mut report = StepReport::not_executed(
            step.index,
            step.id.clone(),
            name.clone(),
            step.command(),
            StepStatus::Skipped,
        );

        match should_run {
            Ok(false) => {
                let condition = step.condition.as_ref().map_or("", |c| c.source());
                emit_step_skipped!(name, condition);
                self.record_step(step, StepStatus::Skipped, &IndexMap::new());
                return report;
            }
            Ok(true) => {}
            Err(error) => {
                emit_step_output!(name, Stream::Stderr, error);
                report.status = if step.continue_on_error {
                    StepStatus::FailedIgnored
                } else {
                    StepStatus::Failed
                };
                report.error = Some(error);
                self.record_step(step, report.status, &IndexMap::new());
                return report;
            }
        }

        emit_step_started!(name, step.command());
        let start = Instant::now();

        let execution = match self.step_env(step, &base) {
            Err(error) => Execution::failed(error),
            Ok(step_env) => match &step.action {
                StepAction::Run {
                    script,
                    shell,
                    working_directory,
                } => {
                    self.run_script(
                        step,
                        &name,
                        &step_env,
                        script,
                        shell.as_deref(),
                        working_directory.as_ref(),
                    )
                    .await
                }
                StepAction::Uses { action, with } => {
                    self.run_action(step, &step_env, action, with).await
                }
            },
        };
        let duration_ms = elapsed_ms(start);

        if let Some(error) = &execution.error
            && !execution.cancelled
        {
            emit_step_output!(name, Stream::Stderr, error);
        }

        report.status = if execution.cancelled {
            StepStatus::Cancelled
        } else if execution.success {
            StepStatus::Success
        } else if step.continue_on_error {
            StepStatus::FailedIgnored
        } else {
            StepStatus::Failed
        };
        emit_step_completed!(
            name,
            execution.success,
            execution.exit_code,
            duration_ms,
            report.status == StepStatus::FailedIgnored
        );

        self.record_step(step, report.status, &execution.outputs);
        report.exit_code = execution.exit_code;
        report.duration_ms = duration_ms;
        report.error = execution.error;
        report.outputs = execution.outputs;
        if !execution.success && !execution.output.is_empty() {
            report.output = Some(execution.output);
        }
        report
    }

    fn step_env(&self, step: &Step, base: &Value) -> Result<IndexMap<String, String>, String> {
        step.env
            .iter()
            .map(|(key, template)| {
                self.render(template, base)
                    .map(|value| (key.clone(), value))
                    .map_err(|e| format!("env.{key}: {e}"))
            })
            .collect()
    }

    /// Contexts for rendering step fields: `env` includes the step's own env.
    fn step_contexts(&self, step_env: &IndexMap<String, String>) -> Value {
        let mut env = self.env.clone();
        env.extend(step_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.contexts(&env)
    }

    fn record_step(&mut self, step: &Step, status: StepStatus, outputs: &IndexMap<String, String>) {
        let Some(id) = &step.id else {
            return;
        };
        let mut entry = Value::object();
        entry.insert(
            "outputs",
            Value::string_object(outputs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        );
        entry.insert("outcome", Value::from(status.outcome()));
        entry.insert("conclusion", Value::from(status.conclusion()));
        self.steps.insert(id.clone(), entry);
    }

    fn timeout(step: &Step) -> Option<Duration> {
        step.timeout_minutes
            .map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
    }

    async fn run_script(
        &mut self,
        step: &Step,
        name: &str,
        step_env: &IndexMap<String, String>,
        script: &Template,
        shell: Option<&str>,
        working_directory: Option<&Template>,
    ) -> Execution {
        let contexts = self.step_contexts(step_env);
        let script = match self.render(script, &contexts) {
            Ok(script) => script,
            Err(error) => return Execution::failed(error),
        };
        let cwd = match working_directory {
            Some(template) => match self.render(template, &contexts) {
                Ok(dir) => self.workspace().join(dir),
                Err(error) => return Execution::failed(error),
            },
            None => self
                .pipeline
                .default_working_directory
                .as_ref()
                .map_or_else(|| self.workspace().to_path_buf(), |dir| self.workspace().join(dir)),
        };

        let mut env = self.process_env(step_env);
        let commands = match FileCommands::create(&self.temp.join("_file_commands"), step.index) {
            Ok(commands) => commands,
            Err(error) => return Execution::failed(error.to_string()),
        };
        env.extend(commands.env_vars());

        let shell_name = shell
            .or(self.pipeline.default_shell.as_deref())
            .or(self.executor.config.default_shell.as_deref());
        let command = Shell::resolve(shell_name, env.get("PATH").map(String::as_str))
            .and_then(|shell| shell.command(&script, &self.temp.join("_scripts"), step.index));
        let (program, args) = match command {
            Ok(command) => command,
            Err(error) => return Execution::failed(error.to_string()),
        };

        let spec = CommandSpec {
            step: name.to_string(),
            program,
            args,
            cwd,
            env,
            timeout: Self::timeout(step),
        };
        let output = match self.executor.runner.run(&spec, &self.executor.cancel).await {
            Ok(output) => output,
            Err(error) => return Execution::failed(error.to_string()),
        };

        let mut execution = Execution {
            success: output.success(),
            cancelled: output.cancelled,
            exit_code: output.exit_code,
            output: output.combined(),
            ..Execution::default()
        };
        if output.cancelled {
            execution.error = Some("cancelled".to_string());
        } else if output.timed_out {
            execution.error = Some(format!(
                "timed out after {} minute(s)",
                step.timeout_minutes.unwrap_or_default()
            ));
        } else if let Some(code) = output.exit_code
            && code != 0
        {
            execution.error = Some(format!("Process completed with exit code {code}."));
        }

        match commands.collect() {
            Ok(FileCommandOutput { env, outputs, path }) => {
                self.env.extend(env);
                self.prepend_paths(path);
                execution.outputs = outputs;
            }
            Err(error) => {
                execution.success = false;
                execution.error = Some(error.to_string());
            }
        }
        execution
    }

    async fn run_action(
        &mut self,
        step: &Step,
        step_env: &IndexMap<String, String>,
        action: &crate::pipeline::ActionRef,
        with: &IndexMap<String, Template>,
    ) -> Execution {
        let contexts = self.step_contexts(step_env);
        let mut inputs = IndexMap::with_capacity(with.len());
        for (key, template) in with {
            match self.render(template, &contexts) {
                Ok(value) => {
                    inputs.insert(key.clone(), value);
                }
                Err(error) => return Execution::failed(format!("with.{key}: {error}")),
            }
        }

        let env = self.process_env(step_env);
        let ctx = ActionContext {
            workspace: self.workspace(),
            toolcache: self.toolcache,
            env: &env,
            cache: self.executor.cache.clone(),
            cache_policy: self.executor.config.cache_policy,
        };

        let timeout = Self::timeout(step);
        let action_run = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, actions::run(action, &inputs, &ctx))
                    .await
                    .map_err(|_| format!("timed out after {} minute(s)", step.timeout_minutes.unwrap_or_default())),
                None => Ok(actions::run(action, &inputs, &ctx).await),
            }
        };
        let result = tokio::select! {
            result = action_run => result,
            () = self.executor.cancel.cancelled() => return Execution::cancelled(),
        };

        match result {
            Ok(Ok(outcome)) => self.apply_outcome(step.index, outcome),
            Ok(Err(error)) => Execution::failed(error.to_string()),
            Err(timed_out) => Execution::failed(timed_out),
        }
    }

    fn apply_outcome(&mut self, index: usize, outcome: ActionOutcome) -> Execution {
        let ActionOutcome {
            outputs,
            env,
            path,
            post,
        } = outcome;
        self.env.extend(env);
        self.prepend_paths(path);
        if let Some(post) = post {
            self.posts.push((index, post));
        }
        Execution {
            success: true,
            outputs,
            ..Execution::default()
        }
    }

    /// Save caches registered before step `index`, which just succeeded.
    ///
    /// The step after `actions/cache` is the guarded install, so the entry is
    /// written as soon as the install completes, whatever happens later.
    async fn save_pending(&mut self, index: usize) {
        if self.posts.is_empty() {
            return;
        }
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.posts)
            .into_iter()
            .partition(|(registered, _)| *registered < index);
        self.posts = pending;
        for (_, post) in due {
            self.run_post(post).await;
        }
    }

    /// Post-run phase: work still pending when no later step succeeded.
    async fn post_steps(&mut self, status: RunStatus) {
        if self.posts.is_empty() {
            return;
        }
        if status != RunStatus::Success {
            tracing::info!(
                %status,
                count = self.posts.len(),
                "Skipping post-run cache save: run did not succeed"
            );
            return;
        }
        for (_, post) in std::mem::take(&mut self.posts) {
            self.run_post(post).await;
        }
    }

    async fn run_post(&self, post: PostAction) {
        match post {
            PostAction::SaveCache { key, paths } => match &self.executor.cache {
                Some(cache) => {
                    actions::cache::save(cache.as_ref(), &key, &paths).await;
                }
                None => tracing::debug!(key = %key, "No cache backend, skipping save"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::runner::{CommandOutput, RunnerError};
    use super::*;
    use crate::context::{EventKind, TriggerEvent};
    use crate::pipeline::{CompileOptions, compile_workflow};
    use crate::workflow::Workflow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails scripts ending in ` fail`; `output k=v` writes a step output.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl Scripted {
        fn scripts(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|spec| spec.args.last().cloned().unwrap_or_default())
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn run(
            &self,
            spec: &CommandSpec,
            _cancel: &CancellationToken,
        ) -> Result<CommandOutput, RunnerError> {
            self.calls.lock().unwrap().push(spec.clone());
            let script = spec.args.last().cloned().unwrap_or_default();
            if let Some(pair) = script.strip_prefix("output ") {
                std::fs::write(&spec.env["GITHUB_OUTPUT"], format!("{pair}\n")).unwrap();
            }
            let code = i32::from(script.ends_with(" fail"));
            Ok(CommandOutput {
                exit_code: Some(code),
                stderr: if code == 0 { String::new() } else { "boom\n".to_string() },
                ..CommandOutput::default()
            })
        }
    }

    fn pipelines(yaml: &str) -> Vec<Pipeline> {
        let workflow = Workflow::from_yaml_str(yaml, "ci.yml").unwrap();
        compile_workflow(&workflow, &CompileOptions::default()).unwrap()
    }

    fn executor(workspace: &TempDir, runner: Arc<Scripted>) -> PipelineExecutor {
        let config = ExecutorConfig::new(workspace.path())
            .with_cache_policy(CachePolicy::Disabled)
            .with_toolcache_root(workspace.path().join(".toolcache"))
            .with_default_shell("sh");
        PipelineExecutor::new(config).unwrap().with_runner(runner)
    }

    fn push_main() -> CIContext {
        CIContext::default().with_trigger(TriggerEvent::new(EventKind::Push, "main"))
    }

    fn statuses(result: &RunResult) -> Vec<StepStatus> {
        result.steps.iter().map(|s| s.status).collect()
    }

    #[tokio::test]
    async fn test_first_fatal_failure_halts_run() {
        let yaml = r"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: one
      - run: two fail
      - run: three
      - if: always()
        run: four
";
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let result = executor(&workspace, runner.clone())
            .execute(&pipelines(yaml)[0], &push_main())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            statuses(&result),
            vec![StepStatus::Success, StepStatus::Failed, StepStatus::NotRun, StepStatus::NotRun]
        );
        assert_eq!(result.first_failure, Some(1));
        assert_eq!(result.steps[1].exit_code, Some(1));
        assert_eq!(result.steps[1].output.as_deref(), Some("boom\n"));
        assert_eq!(runner.scripts(), vec!["one", "two fail"]);
    }

    #[tokio::test]
    async fn test_continue_on_error_is_advisory() {
        let yaml = r"
on: push
jobs:
  lint:
    runs-on: ubuntu-latest
    steps:
      - id: advisory
        run: lint fail
        continue-on-error: true
      - run: echo ${{ steps.advisory.outcome }}/${{ steps.advisory.conclusion }}
";
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let result = executor(&workspace, runner.clone())
            .execute(&pipelines(yaml)[0], &push_main())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(statuses(&result), vec![StepStatus::FailedIgnored, StepStatus::Success]);
        assert_eq!(result.first_failure, None);
        assert_eq!(runner.scripts()[1], "echo failure/success");
    }

    #[tokio::test]
    async fn test_condition_sees_earlier_outputs() {
        let yaml = r"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - id: cache
        run: output cache-hit=true
      - name: Install
        if: steps.cache.outputs.cache-hit != 'true'
        run: install
      - run: test
";
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let result = executor(&workspace, runner.clone())
            .execute(&pipelines(yaml)[0], &push_main())
            .await
            .unwrap();

        assert_eq!(
            statuses(&result),
            vec![StepStatus::Success, StepStatus::Skipped, StepStatus::Success]
        );
        assert_eq!(result.steps[0].outputs["cache-hit"], "true");
        assert_eq!(runner.scripts(), vec!["output cache-hit=true", "test"]);
    }

    #[tokio::test]
    async fn test_not_triggered_runs_nothing() {
        let yaml = r"
on:
  push:
    branches: [main]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: one
";
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let ctx = CIContext::default().with_trigger(TriggerEvent::new(EventKind::Push, "feature"));
        let result = executor(&workspace, runner.clone())
            .execute(&pipelines(yaml)[0], &ctx)
            .await
            .unwrap();
        assert_eq!(result.status, RunStatus::NotTriggered);
        assert!(result.reason.is_some());
        assert!(runner.scripts().is_empty());

        let mut forced = executor(&workspace, runner.clone());
        forced.config.force = true;
        let result = forced.execute(&pipelines(yaml)[0], &ctx).await.unwrap();
        assert_eq!(result.status, RunStatus::Success);
    }

    const MATRIX: &str = r"
on: push
jobs:
  test:
    runs-on: ubuntu-latest
    strategy:
      matrix:
        python-version: ['3.8', '3.9']
    steps:
      - run: test ${{ matrix.python-version }} fail
";

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_combinations() {
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let report = executor(&workspace, runner.clone())
            .execute_workflow(&pipelines(MATRIX), &push_main())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.runs[0].status, RunStatus::Failed);
        assert_eq!(report.runs[1].status, RunStatus::Skipped);
        assert_eq!(runner.scripts(), vec!["test 3.8 fail"]);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_disabled_runs_every_combination() {
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let mut executor = executor(&workspace, runner.clone());
        executor.config.fail_fast = Some(false);
        let report = executor
            .execute_workflow(&pipelines(MATRIX), &push_main())
            .await
            .unwrap();
        assert_eq!(report.runs.len(), 2);
        assert!(report.runs.iter().all(|run| run.status == RunStatus::Failed));
        assert_eq!(runner.scripts().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let yaml = r"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: one
      - run: two
";
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let token = CancellationToken::new();
        token.cancel();
        let report = executor(&workspace, runner.clone())
            .with_cancellation(token)
            .execute_workflow(&pipelines(yaml), &push_main())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.exit_code(), 130);
        assert_eq!(
            statuses(&report.runs[0]),
            vec![StepStatus::NotRun, StepStatus::NotRun]
        );
        assert!(runner.scripts().is_empty());
    }

    #[tokio::test]
    async fn test_process_env_and_contexts() {
        let yaml = r"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    env:
      LEVEL: job
    steps:
      - run: ${{ github.event_name }} ${{ env.LEVEL }} ${{ env.STEP }}
        env:
          STEP: step-${{ env.LEVEL }}
";
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        executor(&workspace, runner.clone())
            .execute(&pipelines(yaml)[0], &push_main())
            .await
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        let spec = &calls[0];
        assert_eq!(spec.args.last().unwrap(), "push job step-job");
        assert_eq!(spec.env["CI"], "true");
        assert_eq!(spec.env["LEVEL"], "job");
        assert_eq!(spec.env["STEP"], "step-job");
        assert_eq!(spec.env["GITHUB_EVENT_NAME"], "push");
        assert_eq!(spec.env["GITHUB_REF"], "refs/heads/main");
        assert!(spec.env.contains_key("GITHUB_OUTPUT"));
        assert_eq!(spec.cwd, workspace.path());
    }

    #[tokio::test]
    async fn test_missing_workspace_is_an_error() {
        let workspace = TempDir::new().unwrap();
        let runner = Arc::new(Scripted::default());
        let mut executor = executor(&workspace, runner);
        executor.config.workspace = workspace.path().join("missing");
        let yaml = "on: push\njobs:\n  b:\n    runs-on: x\n    steps:\n      - run: one\n";
        let result = executor.execute(&pipelines(yaml)[0], &push_main()).await;
        assert!(matches!(result, Err(ExecutorError::Workspace { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_shell_env_and_path_propagate() {
        let yaml = r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: |
          mkdir -p tools
          printf '#!/bin/sh\necho tool-ran\n' > tools/mytool
          chmod +x tools/mytool
          echo "GREETING=hello" >> "$GITHUB_ENV"
          echo "$PWD/tools" >> "$GITHUB_PATH"
      - id: check
        run: |
          test "$GREETING" = hello
          echo "result=$(mytool)" >> "$GITHUB_OUTPUT"
"#;
        let workspace = TempDir::new().unwrap();
        let config = ExecutorConfig::new(workspace.path())
            .with_cache_policy(CachePolicy::Disabled)
            .with_toolcache_root(workspace.path().join(".toolcache"))
            .with_default_shell("sh");
        let result = PipelineExecutor::new(config)
            .unwrap()
            .execute(&pipelines(yaml)[0], &push_main())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Success, "{result:?}");
        assert_eq!(result.steps[1].outputs["result"], "tool-ran");
    }

    #[tokio::test]
    async fn test_cache_saved_once_install_succeeds() {
        let cache_yaml = |install: &str, check: &str| {
            format!(
                r"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - id: cache
        uses: actions/cache@v4
        with:
          path: deps
          key: deps-v1
      - if: steps.cache.outputs.cache-hit != 'true'
        run: {install}
      - run: {check}
"
            )
        };
        let workspace = TempDir::new().unwrap();
        std::fs::create_dir(workspace.path().join("deps")).unwrap();
        std::fs::write(workspace.path().join("deps/lib.txt"), "lib").unwrap();
        let cache_root = TempDir::new().unwrap();
        let backend: Arc<dyn CacheBackend> = Arc::new(LocalCacheBackend::new(cache_root.path()));

        let caching = || {
            let mut executor =
                executor(&workspace, Arc::new(Scripted::default())).with_cache(Some(backend.clone()));
            executor.config.cache_policy = CachePolicy::Normal;
            executor
        };

        // failed install: nothing worth caching
        let failed_install = caching()
            .execute(&pipelines(&cache_yaml("install fail", "check"))[0], &push_main())
            .await
            .unwrap();
        assert_eq!(failed_install.status, RunStatus::Failed);
        assert!(backend.entries().await.unwrap().is_empty());

        // install succeeded, a later check failed: the entry is still written
        let failed_check = caching()
            .execute(&pipelines(&cache_yaml("install", "check fail"))[0], &push_main())
            .await
            .unwrap();
        assert_eq!(failed_check.status, RunStatus::Failed);
        assert_eq!(failed_check.first_failure, Some(2));
        assert_eq!(failed_check.steps[0].outputs["cache-hit"], "false");
        let entries = backend.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "deps-v1");

        // exact hit: install skipped, no second write
        let hit = caching()
            .execute(&pipelines(&cache_yaml("install", "check"))[0], &push_main())
            .await
            .unwrap();
        assert_eq!(hit.status, RunStatus::Success);
        assert_eq!(hit.steps[0].outputs["cache-hit"], "true");
        assert_eq!(hit.steps[1].status, StepStatus::Skipped);
        assert_eq!(backend.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trailing_cache_saved_after_successful_run() {
        let yaml = r"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: build
      - uses: actions/cache@v4
        with:
          path: deps
          key: deps-v2
";
        let workspace = TempDir::new().unwrap();
        std::fs::create_dir(workspace.path().join("deps")).unwrap();
        std::fs::write(workspace.path().join("deps/lib.txt"), "lib").unwrap();
        let cache_root = TempDir::new().unwrap();
        let backend: Arc<dyn CacheBackend> = Arc::new(LocalCacheBackend::new(cache_root.path()));
        let mut executor =
            executor(&workspace, Arc::new(Scripted::default())).with_cache(Some(backend.clone()));
        executor.config.cache_policy = CachePolicy::Normal;

        let result = executor.execute(&pipelines(yaml)[0], &push_main()).await.unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(backend.entries().await.unwrap()[0].key, "deps-v2");
    }
}
