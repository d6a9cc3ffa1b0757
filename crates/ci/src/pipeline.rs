//! Compiled pipelines.
//!
//! [`compile_workflow`] turns a parsed [`Workflow`] into one [`Pipeline`] per
//! selected job and matrix combination. Every `${{ }}` template and `if:`
//! condition is parsed here, so a malformed expression, an unknown action or a
//! duplicate step id is reported before any step runs.

#![allow(unused_assignments)] // False positives from miette derive macro

use crate::actions;
use crate::context::{EventKind, TriggerEvent};
use crate::expr::{Condition, EvalContext, ExprError, Template, Value};
use crate::workflow::{self, Combination, Workflow};
use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;
use miette::Diagnostic;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors raised while compiling a workflow.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    /// `--job` names a job the workflow does not define
    #[error("job '{job}' not found")]
    #[diagnostic(code(stepwise::compile::unknown_job), help("available jobs: {available}"))]
    UnknownJob { job: String, available: String },

    /// Matrix filters exclude every combination
    #[error("no matrix combination of job '{job}' matches {filters}")]
    #[diagnostic(code(stepwise::compile::no_combination))]
    NoMatchingCombination { job: String, filters: String },

    /// A step has an invalid expression
    #[error("invalid expression in job '{job}', step '{step}'")]
    #[diagnostic(code(stepwise::compile::expression))]
    Expression {
        job: String,
        step: String,
        #[source]
        #[diagnostic_source]
        source: ExprError,
    },

    /// A step is structurally invalid
    #[error("invalid step '{step}' in job '{job}': {message}")]
    #[diagnostic(code(stepwise::compile::step))]
    InvalidStep {
        job: String,
        step: String,
        message: String,
        #[help]
        help: Option<String>,
    },
}

/// Selection applied while compiling.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Only compile this job
    pub job: Option<String>,
    /// `key=value` matrix filters; every filter must match
    pub matrix: Vec<(String, String)>,
}

impl CompileOptions {
    /// Select a job.
    #[must_use]
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Add a matrix filter.
    #[must_use]
    pub fn with_matrix(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.matrix.push((key.into(), value.into()));
        self
    }
}

/// A `uses:` reference such as `actions/setup-python@v5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    /// `owner/repo`
    pub name: String,
    /// Ref after `@`, ignored by the built-in implementations
    pub version: Option<String>,
}

impl ActionRef {
    /// Parse a `uses:` value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().split_once('@') {
            Some((name, version)) => Self {
                name: name.to_string(),
                version: Some(version.to_string()),
            },
            None => Self {
                name: raw.trim().to_string(),
                version: None,
            },
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Shell script
    Run {
        /// Script body
        script: Template,
        /// Explicit shell; falls back to the job default
        shell: Option<String>,
        /// Working directory relative to the workspace
        working_directory: Option<Template>,
    },
    /// Built-in action
    Uses {
        /// Action reference
        action: ActionRef,
        /// `with:` inputs
        with: IndexMap<String, Template>,
    },
}

/// One compiled step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Position in the job, from 0
    pub index: usize,
    /// Optional id for `steps.<id>` references
    pub id: Option<String>,
    /// Display name; may contain expressions
    pub name: Template,
    /// Run script or action
    pub action: StepAction,
    /// `if:` condition; `None` means `success()`
    pub condition: Option<Condition>,
    /// Advisory step: failure is recorded but never fails the run
    pub continue_on_error: bool,
    /// Step environment
    pub env: IndexMap<String, Template>,
    /// Kill the step after this many minutes
    pub timeout_minutes: Option<u32>,
}

impl Step {
    /// Name as written, for listings.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.source()
    }

    /// Command line shown in `step.started` events and plans.
    #[must_use]
    pub fn command(&self) -> String {
        match &self.action {
            StepAction::Run { script, .. } => script.source().trim_end().to_string(),
            StepAction::Uses { action, .. } => action.to_string(),
        }
    }
}

/// Branch filter of one trigger event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchFilter {
    /// Positive patterns (a `!` prefix negates); empty accepts every branch
    pub branches: Vec<String>,
    /// Patterns that reject a branch
    pub branches_ignore: Vec<String>,
}

const BRANCH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn branch_matches(pattern: &str, branch: &str) -> bool {
    Pattern::new(pattern).map_or(pattern == branch, |p| p.matches_with(branch, BRANCH_MATCH))
}

impl BranchFilter {
    /// Whether `branch` passes the filter.
    #[must_use]
    pub fn accepts(&self, branch: &str) -> bool {
        if self
            .branches_ignore
            .iter()
            .any(|pattern| branch_matches(pattern, branch))
        {
            return false;
        }
        if self.branches.is_empty() {
            return true;
        }
        let mut accepted = false;
        for pattern in &self.branches {
            match pattern.strip_prefix('!') {
                Some(negated) => {
                    if branch_matches(negated, branch) {
                        accepted = false;
                    }
                }
                None => {
                    if branch_matches(pattern, branch) {
                        accepted = true;
                    }
                }
            }
        }
        accepted
    }

    fn describe(&self) -> String {
        if self.branches_ignore.is_empty() {
            format!("[{}]", self.branches.join(", "))
        } else {
            format!(
                "[{}] ignoring [{}]",
                self.branches.join(", "),
                self.branches_ignore.join(", ")
            )
        }
    }
}

/// Events a pipeline reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triggers {
    /// `push` filter
    pub push: Option<BranchFilter>,
    /// `pull_request` filter (matches the target branch)
    pub pull_request: Option<BranchFilter>,
    /// `workflow_dispatch` enabled
    pub manual: bool,
}

impl Triggers {
    /// Build from the workflow's `on:` block.
    #[must_use]
    pub fn from_workflow(on: &workflow::WorkflowTriggers) -> Self {
        Self {
            push: on.push.as_ref().map(|push| BranchFilter {
                branches: push.branches.clone(),
                branches_ignore: push.branches_ignore.clone(),
            }),
            pull_request: on.pull_request.as_ref().map(|pr| BranchFilter {
                branches: pr.branches.clone(),
                branches_ignore: pr.branches_ignore.clone(),
            }),
            manual: on.workflow_dispatch.is_some(),
        }
    }

    /// Whether the event triggers the pipeline.
    #[must_use]
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.mismatch_reason(event).is_none()
    }

    /// Why the event does not trigger the pipeline, if it does not.
    #[must_use]
    pub fn mismatch_reason(&self, event: &TriggerEvent) -> Option<String> {
        let filter = match event.kind {
            EventKind::Manual => {
                return (!self.manual).then(|| "workflow_dispatch is not enabled".to_string());
            }
            EventKind::Push => self.push.as_ref(),
            EventKind::PullRequest => self.pull_request.as_ref(),
        };
        match filter {
            None => Some(format!("{} events are not enabled", event.kind)),
            Some(filter) if !filter.accepts(&event.branch) => Some(format!(
                "branch '{}' does not match {} filter {}",
                event.branch,
                event.kind,
                filter.describe()
            )),
            Some(_) => None,
        }
    }
}

/// One job instantiated for one matrix combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Workflow display name
    pub workflow: String,
    /// Job key
    pub job_id: String,
    /// Job display name including matrix values
    pub job_name: String,
    /// Resolved runner label
    pub runs_on: String,
    /// Matrix combination
    pub matrix: Combination,
    /// Stop later combinations after a failure
    pub fail_fast: bool,
    /// Trigger filters
    pub triggers: Triggers,
    /// Workflow and job environment, job values winning
    pub env: IndexMap<String, Template>,
    /// `defaults.run.shell`
    pub default_shell: Option<String>,
    /// `defaults.run.working-directory`
    pub default_working_directory: Option<String>,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Pipeline {
    /// Step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id.as_deref() == Some(id))
    }
}

/// Compile a workflow into pipelines.
///
/// # Errors
///
/// Returns an error for unknown jobs, empty matrix selections and invalid
/// steps.
pub fn compile_workflow(
    workflow: &Workflow,
    options: &CompileOptions,
) -> Result<Vec<Pipeline>, CompileError> {
    let jobs: Vec<(&String, &workflow::Job)> = match &options.job {
        Some(job) => {
            let (id, def) = workflow.jobs.get_key_value(job).ok_or_else(|| {
                CompileError::UnknownJob {
                    job: job.clone(),
                    available: workflow.jobs.keys().cloned().collect::<Vec<_>>().join(", "),
                }
            })?;
            vec![(id, def)]
        }
        None => workflow.jobs.iter().collect(),
    };

    let triggers = Triggers::from_workflow(&workflow.on);
    let mut pipelines = Vec::new();
    for (job_id, job) in jobs {
        let strategy = job.strategy.clone().unwrap_or_default();
        let combos: Vec<Combination> = strategy
            .matrix
            .combinations()
            .into_iter()
            .filter(|combo| {
                options
                    .matrix
                    .iter()
                    .all(|(k, v)| combo.get(k).is_some_and(|actual| actual == v))
            })
            .collect();
        if combos.is_empty() {
            return Err(CompileError::NoMatchingCombination {
                job: job_id.clone(),
                filters: options
                    .matrix
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        for combo in combos {
            pipelines.push(compile_job(
                workflow,
                job_id,
                job,
                combo,
                strategy.fail_fast.unwrap_or(true),
                triggers.clone(),
            )?);
        }
    }
    tracing::debug!(count = pipelines.len(), "Compiled workflow");
    Ok(pipelines)
}

fn compile_job(
    workflow: &Workflow,
    job_id: &str,
    job: &workflow::Job,
    matrix: Combination,
    fail_fast: bool,
    triggers: Triggers,
) -> Result<Pipeline, CompileError> {
    let expr_error = |step: &str, source: ExprError| CompileError::Expression {
        job: job_id.to_string(),
        step: step.to_string(),
        source,
    };

    // runs-on and the job name may only reference the matrix
    let mut contexts = Value::object();
    contexts.insert(
        "matrix",
        Value::string_object(matrix.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
    );
    let eval = EvalContext::new(&contexts, Path::new("."));
    let render = |field: &str, text: &str| {
        Template::parse(text)
            .and_then(|template| template.render(&eval))
            .map_err(|source| expr_error(field, source))
    };

    let runs_on = render("runs-on", job.runs_on.primary())?;
    let base_name = job.name.as_deref().unwrap_or(job_id);
    let mut job_name = render("name", base_name)?;
    if !matrix.is_empty() && !base_name.contains("${{") {
        let values: Vec<&str> = matrix.values().map(String::as_str).collect();
        job_name = format!("{job_name} ({})", values.join(", "));
    }

    let mut env = IndexMap::new();
    for (key, value) in workflow.env.iter().chain(&job.env) {
        let template = Template::parse(value).map_err(|source| expr_error("env", source))?;
        env.insert(key.clone(), template);
    }

    let run_defaults = job.defaults.as_ref().and_then(|d| d.run.clone()).unwrap_or_default();

    let mut steps = Vec::with_capacity(job.steps.len());
    let mut seen_ids: Vec<&str> = Vec::new();
    for (index, raw) in job.steps.iter().enumerate() {
        let step = compile_step(job_id, index, raw)?;
        if let Some(id) = raw.id.as_deref() {
            if seen_ids.contains(&id) {
                return Err(CompileError::InvalidStep {
                    job: job_id.to_string(),
                    step: step.display_name().to_string(),
                    message: format!("duplicate step id '{id}'"),
                    help: Some("step ids must be unique within a job".to_string()),
                });
            }
            seen_ids.push(id);
        }
        steps.push(step);
    }

    Ok(Pipeline {
        workflow: workflow.display_name().to_string(),
        job_id: job_id.to_string(),
        job_name,
        runs_on,
        matrix,
        fail_fast,
        triggers,
        env,
        default_shell: run_defaults.shell,
        default_working_directory: run_defaults.working_directory,
        steps,
    })
}

fn compile_step(job_id: &str, index: usize, raw: &workflow::Step) -> Result<Step, CompileError> {
    let fallback_name = match (&raw.run, &raw.uses) {
        (Some(script), _) => format!("Run {}", script.lines().next().unwrap_or("").trim()),
        (None, Some(uses)) => format!("Run {}", uses.trim()),
        (None, None) => format!("step {}", index + 1),
    };
    let label = raw.name.clone().unwrap_or(fallback_name);
    let invalid = |message: String, help: Option<&str>| CompileError::InvalidStep {
        job: job_id.to_string(),
        step: label.clone(),
        message,
        help: help.map(str::to_string),
    };
    let parse = |text: &str| {
        Template::parse(text).map_err(|source| CompileError::Expression {
            job: job_id.to_string(),
            step: label.clone(),
            source,
        })
    };

    if let Some(id) = raw.id.as_deref()
        && !is_valid_step_id(id)
    {
        return Err(invalid(
            format!("invalid step id '{id}'"),
            Some("ids start with a letter or '_' and contain only alphanumerics, '-' and '_'"),
        ));
    }

    let action = match (&raw.run, &raw.uses) {
        (Some(_), Some(_)) => {
            return Err(invalid(
                "a step cannot have both `run` and `uses`".to_string(),
                None,
            ));
        }
        (None, None) => {
            return Err(invalid(
                "a step must have either `run` or `uses`".to_string(),
                None,
            ));
        }
        (Some(script), None) => StepAction::Run {
            script: parse(script)?,
            shell: raw.shell.clone(),
            working_directory: raw.working_directory.as_deref().map(parse).transpose()?,
        },
        (None, Some(uses)) => {
            let action = ActionRef::parse(uses);
            if !actions::is_supported(&action.name) {
                return Err(invalid(
                    format!("unsupported action '{uses}'"),
                    Some(format!("supported actions: {}", actions::SUPPORTED.join(", ")).as_str()),
                ));
            }
            let mut with = IndexMap::new();
            for (key, value) in &raw.with_inputs {
                let text = workflow::scalar_to_string(value).ok_or_else(|| {
                    invalid(format!("input '{key}' must be a scalar value"), None)
                })?;
                with.insert(key.clone(), parse(&text)?);
            }
            StepAction::Uses { action, with }
        }
    };

    let condition = raw
        .if_condition
        .as_deref()
        .map(|source| {
            Condition::parse(source).map_err(|source| CompileError::Expression {
                job: job_id.to_string(),
                step: label.clone(),
                source,
            })
        })
        .transpose()?;

    let mut env = IndexMap::new();
    for (key, value) in &raw.env {
        env.insert(key.clone(), parse(value)?);
    }

    Ok(Step {
        index,
        id: raw.id.clone(),
        name: parse(&label)?,
        action,
        condition,
        continue_on_error: raw.continue_on_error.unwrap_or(false),
        env,
        timeout_minutes: raw.timeout_minutes,
    })
}

fn is_valid_step_id(id: &str) -> bool {
    let mut chars = id.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW: &str = r"
name: Python package
on:
  push:
    branches: [ main ]
  pull_request:
    branches: [ main ]
jobs:
  build:
    runs-on: ${{ matrix.os }}
    strategy:
      matrix:
        os: [ubuntu-latest]
        python-version: ['3.8', '3.9']
    steps:
      - uses: actions/checkout@v4
      - name: Cache pip
        id: cache
        uses: actions/cache@v4
        with:
          path: ${{ env.pythonLocation }}
          key: ${{ matrix.os }}-pip-v0-${{ hashFiles('requirements.txt') }}
      - name: Install
        if: steps.cache.outputs.cache-hit != 'true'
        run: |
          python -m pip install --upgrade pip
          pip install flake8 pytest
      - run: pytest
";

    fn workflow(yaml: &str) -> Workflow {
        Workflow::from_yaml_str(yaml, "test.yml").unwrap()
    }

    #[test]
    fn test_compile_expands_matrix() {
        let pipelines = compile_workflow(&workflow(WORKFLOW), &CompileOptions::default()).unwrap();
        assert_eq!(pipelines.len(), 2);
        assert_eq!(pipelines[0].runs_on, "ubuntu-latest");
        assert_eq!(pipelines[0].job_name, "build (ubuntu-latest, 3.8)");
        assert_eq!(pipelines[1].matrix["python-version"], "3.9");
        assert!(pipelines[0].fail_fast);
    }

    #[test]
    fn test_matrix_filter() {
        let options = CompileOptions::default().with_matrix("python-version", "3.9");
        let pipelines = compile_workflow(&workflow(WORKFLOW), &options).unwrap();
        assert_eq!(pipelines.len(), 1);

        let none = CompileOptions::default().with_matrix("python-version", "2.7");
        assert!(matches!(
            compile_workflow(&workflow(WORKFLOW), &none),
            Err(CompileError::NoMatchingCombination { .. })
        ));
    }

    #[test]
    fn test_default_step_names_and_commands() {
        let pipelines = compile_workflow(&workflow(WORKFLOW), &CompileOptions::default()).unwrap();
        let steps = &pipelines[0].steps;
        assert_eq!(steps[0].display_name(), "Run actions/checkout@v4");
        assert_eq!(steps[3].display_name(), "Run pytest");
        assert_eq!(steps[2].display_name(), "Install");
        assert!(steps[2].condition.is_some());
        assert_eq!(
            steps[2].command(),
            "python -m pip install --upgrade pip\npip install flake8 pytest"
        );
        assert!(pipelines[0].step("cache").is_some());
    }

    #[test]
    fn test_unknown_job() {
        let options = CompileOptions::default().with_job("deploy");
        let err = compile_workflow(&workflow(WORKFLOW), &options).unwrap_err();
        assert!(matches!(err, CompileError::UnknownJob { ref available, .. } if available == "build"));
    }

    #[test]
    fn test_duplicate_step_id() {
        let yaml = "on: push\njobs:\n  b:\n    runs-on: x\n    steps:\n      - id: a\n        run: 'true'\n      - id: a\n        run: 'true'\n";
        let err = compile_workflow(&workflow(yaml), &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn test_invalid_step_id() {
        let yaml = "on: push\njobs:\n  b:\n    runs-on: x\n    steps:\n      - id: 1st\n        run: 'true'\n";
        let err = compile_workflow(&workflow(yaml), &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("invalid step id"));
    }

    #[test]
    fn test_unsupported_action() {
        let yaml = "on: push\njobs:\n  b:\n    runs-on: x\n    steps:\n      - uses: docker/build-push-action@v5\n";
        let err = compile_workflow(&workflow(yaml), &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported action"));
    }

    #[test]
    fn test_step_needs_run_or_uses() {
        let yaml = "on: push\njobs:\n  b:\n    runs-on: x\n    steps:\n      - name: nothing\n";
        let err = compile_workflow(&workflow(yaml), &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("either `run` or `uses`"));
    }

    #[test]
    fn test_bad_expression_is_compile_error() {
        let yaml = "on: push\njobs:\n  b:\n    runs-on: x\n    steps:\n      - if: nosuch()\n        run: 'true'\n";
        let err = compile_workflow(&workflow(yaml), &CompileOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Expression {
                source: ExprError::UnknownFunction { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_triggers() {
        let pipelines = compile_workflow(&workflow(WORKFLOW), &CompileOptions::default()).unwrap();
        let triggers = &pipelines[0].triggers;
        assert!(triggers.matches(&TriggerEvent::new(EventKind::Push, "main")));
        assert!(triggers.matches(&TriggerEvent::new(EventKind::PullRequest, "main")));
        assert!(!triggers.matches(&TriggerEvent::new(EventKind::Push, "feature")));
        assert!(!triggers.matches(&TriggerEvent::new(EventKind::Manual, "main")));
        let reason = triggers
            .mismatch_reason(&TriggerEvent::new(EventKind::Push, "feature"))
            .unwrap();
        assert!(reason.contains("feature"));
    }

    #[test]
    fn test_branch_filter_patterns() {
        let filter = BranchFilter {
            branches: vec!["releases/*".into(), "!releases/*-alpha".into()],
            branches_ignore: vec![],
        };
        assert!(filter.accepts("releases/v1"));
        assert!(!filter.accepts("releases/v2-alpha"));
        assert!(!filter.accepts("main"));

        let ignore = BranchFilter {
            branches: vec![],
            branches_ignore: vec!["docs/*".into()],
        };
        assert!(ignore.accepts("main"));
        assert!(!ignore.accepts("docs/readme"));

        let star = BranchFilter {
            branches: vec!["feature/*".into()],
            branches_ignore: vec![],
        };
        assert!(star.accepts("feature/x"));
        assert!(!star.accepts("feature/x/y"));
    }

    #[test]
    fn test_action_ref() {
        let action = ActionRef::parse("actions/setup-python@v5");
        assert_eq!(action.name, "actions/setup-python");
        assert_eq!(action.version.as_deref(), Some("v5"));
        assert_eq!(action.to_string(), "actions/setup-python@v5");
    }
}
