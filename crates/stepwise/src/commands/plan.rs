//! `stepwise plan`

use super::{Outcome, resolve_workspace};
use crate::cli::{CliError, OkEnvelope, SelectArgs};
use serde::Serialize;
use stepwise_ci::Pipeline;
use stepwise_ci::report::terminal;
use stepwise_core::config::Config;

#[derive(Debug, Serialize)]
struct PlannedStep {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    command: String,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
    continue_on_error: bool,
}

#[derive(Debug, Serialize)]
struct PlannedPipeline {
    job_id: String,
    job_name: String,
    runs_on: String,
    matrix: indexmap::IndexMap<String, String>,
    steps: Vec<PlannedStep>,
}

impl From<&Pipeline> for PlannedPipeline {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            job_id: pipeline.job_id.clone(),
            job_name: pipeline.job_name.clone(),
            runs_on: pipeline.runs_on.clone(),
            matrix: pipeline.matrix.clone(),
            steps: pipeline
                .steps
                .iter()
                .map(|step| PlannedStep {
                    index: step.index,
                    id: step.id.clone(),
                    name: step.display_name().to_string(),
                    command: step.command(),
                    condition: step.condition.as_ref().map(|c| c.source().to_string()),
                    continue_on_error: step.continue_on_error,
                })
                .collect(),
        }
    }
}

/// Compile the selected workflow and list its steps without running them.
///
/// # Errors
///
/// Returns an error when the workspace, configuration or workflow is invalid.
pub fn execute(args: &SelectArgs, json: bool) -> Result<Outcome, CliError> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    let config = Config::load(&workspace)?;
    let pipelines = super::run::load_pipelines(args, &config, &workspace)?;

    if json {
        let planned: Vec<PlannedPipeline> = pipelines.iter().map(PlannedPipeline::from).collect();
        let text = serde_json::to_string_pretty(&OkEnvelope::new(planned))
            .map_err(|e| CliError::other(format!("Failed to serialize plan: {e}")))?;
        return Ok(Outcome::output(text));
    }
    Ok(Outcome::output(terminal::format_plan(&pipelines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_ci::presets::{PythonPackagePreset, python_package};
    use stepwise_ci::{CompileOptions, compile_workflow};

    #[test]
    fn test_planned_pipeline_shape() {
        let workflow = python_package(&PythonPackagePreset::default());
        let pipelines = compile_workflow(&workflow, &CompileOptions::default()).unwrap();
        let planned = PlannedPipeline::from(&pipelines[0]);

        assert_eq!(planned.job_id, "build");
        assert_eq!(planned.steps.len(), 11);
        assert_eq!(
            planned.steps[4].condition.as_deref(),
            Some("steps.cache.outputs.cache-hit != 'true'")
        );
        assert_eq!(planned.steps[7].name, "Lint with flake8");
        assert!(planned.steps.iter().all(|step| !step.continue_on_error));

        let json = serde_json::to_value(&planned).unwrap();
        assert_eq!(json["steps"][3]["id"], "cache");
        assert!(json["steps"][0].get("if").is_none());
    }
}
