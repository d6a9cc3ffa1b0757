//! Workflow schema types.
//!
//! A GitHub Actions compatible subset: enough of `on`, `jobs`, `strategy` and
//! step syntax to run single-job package workflows. Unknown keys are ignored
//! so that real-world workflow files load without edits.

use super::matrix::Matrix;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// A workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Trigger configuration
    #[serde(rename = "on")]
    pub on: WorkflowTriggers,

    /// Environment variables available to all jobs
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "scalar_map"
    )]
    pub env: IndexMap<String, String>,

    /// Job definitions (order preserved via `IndexMap`)
    pub jobs: IndexMap<String, Job>,
}

/// Workflow trigger configuration.
///
/// Accepts the string (`on: push`), list (`on: [push, pull_request]`) and map
/// forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TriggersRepr")]
pub struct WorkflowTriggers {
    /// Trigger on push events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushTrigger>,

    /// Trigger on pull request events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestTrigger>,

    /// Manual trigger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_dispatch: Option<WorkflowDispatchTrigger>,

    /// Other events (`schedule`, `release`, ...) which never fire locally
    #[serde(skip)]
    pub other: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggersRepr {
    Single(String),
    List(Vec<String>),
    Map(IndexMap<String, Option<serde_yaml::Value>>),
}

impl TryFrom<TriggersRepr> for WorkflowTriggers {
    type Error = String;

    fn try_from(repr: TriggersRepr) -> Result<Self, Self::Error> {
        let entries: Vec<(String, Option<serde_yaml::Value>)> = match repr {
            TriggersRepr::Single(event) => vec![(event, None)],
            TriggersRepr::List(events) => events.into_iter().map(|e| (e, None)).collect(),
            TriggersRepr::Map(map) => map.into_iter().collect(),
        };

        let mut triggers = Self::default();
        for (event, config) in entries {
            let config = config.filter(|v| !v.is_null());
            match event.as_str() {
                "push" => triggers.push = Some(trigger_config(&event, config)?),
                "pull_request" => triggers.pull_request = Some(trigger_config(&event, config)?),
                "workflow_dispatch" => {
                    triggers.workflow_dispatch = Some(trigger_config(&event, config)?);
                }
                _ => triggers.other.push(event),
            }
        }
        Ok(triggers)
    }
}

fn trigger_config<T>(event: &str, config: Option<serde_yaml::Value>) -> Result<T, String>
where
    T: Default + serde::de::DeserializeOwned,
{
    config.map_or_else(
        || Ok(T::default()),
        |value| serde_yaml::from_value(value).map_err(|e| format!("invalid `{event}` trigger: {e}")),
    )
}

/// Push event trigger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PushTrigger {
    /// Branch patterns to trigger on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,

    /// Branch patterns to ignore
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches_ignore: Vec<String>,

    /// Tag patterns to trigger on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Path patterns that must be matched to trigger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// Path patterns to ignore
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths_ignore: Vec<String>,
}

/// Pull request event trigger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PullRequestTrigger {
    /// Target branch patterns to trigger on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,

    /// Target branch patterns to ignore
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches_ignore: Vec<String>,

    /// Activity types to trigger on (e.g., "opened", "synchronize")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,

    /// Path patterns that must be matched to trigger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// Path patterns to ignore
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths_ignore: Vec<String>,
}

/// Manual workflow dispatch trigger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDispatchTrigger {
    /// Input parameters for manual trigger
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, serde_yaml::Value>,
}

/// A job in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    /// Job display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Runner label(s)
    pub runs_on: RunsOn,

    /// Job-level environment variables
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "scalar_map"
    )]
    pub env: IndexMap<String, String>,

    /// Defaults applied to every `run` step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,

    /// Matrix strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    /// Job timeout in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,

    /// Job steps (executed sequentially)
    pub steps: Vec<Step>,
}

/// Runner label(s) from `runs-on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunsOn {
    /// Single runner label (e.g., "ubuntu-latest")
    Label(String),
    /// Multiple runner labels
    Labels(Vec<String>),
}

impl RunsOn {
    /// The primary label; may contain `${{ }}` expressions.
    #[must_use]
    pub fn primary(&self) -> &str {
        match self {
            Self::Label(label) => label,
            Self::Labels(labels) => labels.first().map_or("", String::as_str),
        }
    }
}

/// `defaults:` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Defaults for `run` steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunDefaults>,
}

/// `defaults.run` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunDefaults {
    /// Default shell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Default working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

/// `strategy:` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Strategy {
    /// Matrix definition
    #[serde(default)]
    pub matrix: Matrix,

    /// Stop remaining combinations after the first failure (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
}

/// A step in a job.
///
/// Steps either `uses` an action or `run` a shell command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    /// Step display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Unique identifier for referencing step outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Conditional execution expression
    #[serde(
        rename = "if",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_scalar"
    )]
    pub if_condition: Option<String>,

    /// Action to use (e.g., "actions/checkout@v4")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,

    /// Shell command(s) to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Working directory for run commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Shell to use for run commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Action inputs (for `uses` steps)
    #[serde(rename = "with", default, skip_serializing_if = "IndexMap::is_empty")]
    pub with_inputs: IndexMap<String, serde_yaml::Value>,

    /// Step environment variables
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "scalar_map"
    )]
    pub env: IndexMap<String, String>,

    /// Continue on error (don't fail the job)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,

    /// Step timeout in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

impl Step {
    /// Create a step that uses an action
    pub fn uses(action: impl Into<String>) -> Self {
        Self {
            uses: Some(action.into()),
            ..Default::default()
        }
    }

    /// Create a step that runs a shell command
    pub fn run(command: impl Into<String>) -> Self {
        Self {
            run: Some(command.into()),
            ..Default::default()
        }
    }

    /// Set the step name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the step ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a with input
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.with_inputs.insert(key.into(), value.into());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set a condition
    #[must_use]
    pub fn with_if(mut self, condition: impl Into<String>) -> Self {
        self.if_condition = Some(condition.into());
        self
    }

    /// Set working directory
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the shell
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Mark the step advisory: a failure is recorded but never fails the job
    #[must_use]
    pub const fn continue_on_error(mut self) -> Self {
        self.continue_on_error = Some(true);
        self
    }
}

/// Render a YAML scalar the way an environment variable would see it.
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => None,
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            scalar_to_string(&value)
                .map(|v| (key.clone(), v))
                .ok_or_else(|| serde::de::Error::custom(format!("`{key}` must be a scalar value")))
        })
        .collect()
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match raw {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a string or boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builder() {
        let step = Step::uses("actions/checkout@v4")
            .with_name("Checkout")
            .with_input("fetch-depth", serde_yaml::Value::Number(2.into()));

        assert_eq!(step.name, Some("Checkout".to_string()));
        assert_eq!(step.uses, Some("actions/checkout@v4".to_string()));
        assert!(step.with_inputs.contains_key("fetch-depth"));
    }

    #[test]
    fn test_trigger_forms() {
        let single: WorkflowTriggers = serde_yaml::from_str("push").unwrap();
        assert!(single.push.is_some());
        assert!(single.pull_request.is_none());

        let list: WorkflowTriggers = serde_yaml::from_str("[push, pull_request, schedule]").unwrap();
        assert!(list.push.is_some());
        assert!(list.pull_request.is_some());
        assert_eq!(list.other, vec!["schedule".to_string()]);

        let map: WorkflowTriggers = serde_yaml::from_str(
            "push:\n  branches: [main]\npull_request:\n  branches-ignore: ['docs/**']\nworkflow_dispatch:\n",
        )
        .unwrap();
        assert_eq!(map.push.unwrap().branches, vec!["main".to_string()]);
        assert_eq!(
            map.pull_request.unwrap().branches_ignore,
            vec!["docs/**".to_string()]
        );
        assert!(map.workflow_dispatch.is_some());
    }

    #[test]
    fn test_scalar_env_values() {
        let step: Step = serde_yaml::from_str(
            "run: echo\nenv:\n  RETRIES: 3\n  DEBUG: true\n  NAME: bcdi\n",
        )
        .unwrap();
        assert_eq!(step.env["RETRIES"], "3");
        assert_eq!(step.env["DEBUG"], "true");
        assert_eq!(step.env["NAME"], "bcdi");
    }

    #[test]
    fn test_env_rejects_nested_values() {
        let result: Result<Step, _> = serde_yaml::from_str("run: echo\nenv:\n  A: [1, 2]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_boolean_if() {
        let step: Step = serde_yaml::from_str("run: echo\nif: false\n").unwrap();
        assert_eq!(step.if_condition.as_deref(), Some("false"));
    }

    #[test]
    fn test_runs_on_forms() {
        let label: RunsOn = serde_yaml::from_str("ubuntu-latest").unwrap();
        assert_eq!(label.primary(), "ubuntu-latest");
        let labels: RunsOn = serde_yaml::from_str("[self-hosted, linux]").unwrap();
        assert_eq!(labels.primary(), "self-hosted");
    }
}
