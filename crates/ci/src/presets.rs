//! Built-in workflows.
//!
//! `stepwise init` writes one of these as a starting point.

use crate::workflow::{
    Job, Matrix, PullRequestTrigger, PushTrigger, RunsOn, Step, Strategy, Workflow,
    WorkflowTriggers,
};
use indexmap::IndexMap;

/// Parameters of the Python package workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonPackagePreset {
    /// Source directory checked by the formatters, linters and type checker
    pub package: String,
    /// Branch that push and pull request events must target
    pub branch: String,
    /// Interpreter versions, one matrix combination each
    pub python_versions: Vec<String>,
    /// Runner label
    pub os: String,
}

impl Default for PythonPackagePreset {
    fn default() -> Self {
        Self {
            package: "bcdi".to_string(),
            branch: "main".to_string(),
            python_versions: vec!["3.9".to_string()],
            os: "ubuntu-latest".to_string(),
        }
    }
}

/// Lint, type-check and test a Python package on every interpreter version.
///
/// Dependencies are cached under `{os}-pip-v0-{hash of requirements.txt}`;
/// the install step only runs without an exact hit.
#[must_use]
pub fn python_package(preset: &PythonPackagePreset) -> Workflow {
    let package = &preset.package;
    let branches = vec![preset.branch.clone()];

    let steps = vec![
        Step::uses("actions/checkout@v4"),
        Step::uses("actions/setup-python@v5")
            .with_name("Set up Python ${{ matrix.python-version }}")
            .with_input("python-version", "${{ matrix.python-version }}"),
        Step::run(
            "which python\npython -c \"import site; print(site.getsitepackages())\"",
        )
        .with_name("Show interpreter"),
        Step::uses("actions/cache@v4")
            .with_name("Cache pip dependencies")
            .with_id("cache")
            .with_input("path", "${{ env.pythonLocation }}")
            .with_input(
                "key",
                "${{ matrix.os }}-pip-v0-${{ hashFiles('requirements.txt') }}",
            )
            .with_input("restore-keys", "${{ matrix.os }}-pip-"),
        Step::run(
            "python -m pip install --upgrade pip\n\
             pip install flake8 pytest\n\
             if [ -f requirements.txt ]; then pip install -r requirements.txt; fi",
        )
        .with_name("Install dependencies")
        .with_if("steps.cache.outputs.cache-hit != 'true'"),
        Step::run(format!("black --check {package}")).with_name("Check formatting with black"),
        Step::run(format!("isort --check-only {package}")).with_name("Check imports with isort"),
        Step::run(format!(
            "flake8 {package} --count --select=E9,F63,F7,F82 --show-source --statistics\n\
             flake8 {package} --count --exit-zero --max-complexity=10 --max-line-length=88 --statistics"
        ))
        .with_name("Lint with flake8"),
        Step::run(format!("mypy {package}")).with_name("Type-check with mypy"),
        Step::run("pip install -e .").with_name("Install package"),
        Step::run("pytest").with_name("Test with pytest"),
    ];

    let job = Job {
        name: None,
        runs_on: RunsOn::Label("${{ matrix.os }}".to_string()),
        env: IndexMap::new(),
        defaults: None,
        strategy: Some(Strategy {
            matrix: Matrix::axis("os", [preset.os.clone()])
                .with_axis("python-version", preset.python_versions.iter().cloned()),
            fail_fast: None,
        }),
        timeout_minutes: None,
        steps,
    };

    let mut jobs = IndexMap::new();
    jobs.insert("build".to_string(), job);

    Workflow {
        name: Some("Python package".to_string()),
        on: WorkflowTriggers {
            push: Some(PushTrigger {
                branches: branches.clone(),
                ..PushTrigger::default()
            }),
            pull_request: Some(PullRequestTrigger {
                branches,
                ..PullRequestTrigger::default()
            }),
            ..WorkflowTriggers::default()
        },
        env: IndexMap::new(),
        jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EventKind, TriggerEvent};
    use crate::pipeline::{CompileOptions, StepAction, compile_workflow};

    #[test]
    fn test_python_package_compiles_to_eleven_steps() {
        let workflow = python_package(&PythonPackagePreset::default());
        let pipelines = compile_workflow(&workflow, &CompileOptions::default()).unwrap();
        assert_eq!(pipelines.len(), 1);

        let pipeline = &pipelines[0];
        assert_eq!(pipeline.runs_on, "ubuntu-latest");
        assert_eq!(pipeline.matrix["python-version"], "3.9");
        assert_eq!(pipeline.steps.len(), 11);

        assert!(pipeline.steps.iter().all(|step| !step.continue_on_error));
        assert!(pipeline.steps[4].condition.is_some());
        assert!(pipeline.steps[4].command().contains("pip install flake8 pytest\n"));

        let lint = pipeline.steps[7].command();
        let runs: Vec<_> = lint.lines().collect();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].contains("--select=E9,F63,F7,F82"));
        assert!(runs[1].contains("--exit-zero"));
        assert!(runs[1].contains("--max-line-length=88"));
        assert!(matches!(
            &pipeline.step("cache").unwrap().action,
            StepAction::Uses { action, .. } if action.name == "actions/cache"
        ));
    }

    #[test]
    fn test_python_package_triggers() {
        let workflow = python_package(&PythonPackagePreset::default());
        let pipeline = &compile_workflow(&workflow, &CompileOptions::default()).unwrap()[0];
        assert!(pipeline.triggers.matches(&TriggerEvent::new(EventKind::Push, "main")));
        assert!(
            pipeline
                .triggers
                .matches(&TriggerEvent::new(EventKind::PullRequest, "main"))
        );
        assert!(!pipeline.triggers.matches(&TriggerEvent::new(EventKind::Push, "dev")));
    }

    #[test]
    fn test_python_versions_expand_matrix() {
        let preset = PythonPackagePreset {
            package: "mypkg".to_string(),
            python_versions: vec!["3.10".to_string(), "3.11".to_string()],
            ..PythonPackagePreset::default()
        };
        let workflow = python_package(&preset);
        let pipelines = compile_workflow(&workflow, &CompileOptions::default()).unwrap();
        assert_eq!(pipelines.len(), 2);
        assert_eq!(pipelines[1].matrix["python-version"], "3.11");
        assert_eq!(pipelines[0].steps[5].command(), "black --check mypkg");
    }

    #[test]
    fn test_yaml_reloads_identically() {
        let workflow = python_package(&PythonPackagePreset::default());
        let yaml = workflow.to_yaml().unwrap();
        assert!(yaml.contains("hashFiles('requirements.txt')"));
        let reloaded = Workflow::from_yaml_str(&yaml, "python-package.yml").unwrap();
        assert_eq!(reloaded, workflow);
    }
}
