use super::WorkflowReport;
use stepwise_core::Result;

/// Writes the workflow report to a JSON file
///
/// # Errors
/// Returns error if file creation or JSON serialization fails
pub fn write_report(report: &WorkflowReport, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| stepwise_core::Error::io(e, parent, "create_dir"))?;
    }
    let file = std::fs::File::create(path)
        .map_err(|e| stepwise_core::Error::io(e, path, "create_report"))?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| stepwise_core::Error::io(e.into(), path, "write_report"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        ContextReport, RunResult, RunStatus, StepReport, StepStatus, WorkflowReport,
    };
    use chrono::Utc;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn create_test_report() -> WorkflowReport {
        let mut matrix = IndexMap::new();
        matrix.insert("python-version".to_string(), "3.9".to_string());
        WorkflowReport {
            version: "1".to_string(),
            workflow: "Python package".to_string(),
            context: ContextReport {
                provider: "github".to_string(),
                event: "push".to_string(),
                branch: "main".to_string(),
                sha: "abc123".to_string(),
            },
            started_at: Utc::now(),
            duration_ms: 1234,
            status: RunStatus::Failed,
            runs: vec![RunResult {
                job_id: "build".to_string(),
                job_name: "build (3.9)".to_string(),
                matrix,
                status: RunStatus::Failed,
                reason: None,
                first_failure: Some(0),
                steps: vec![StepReport {
                    exit_code: Some(1),
                    output: Some("would reformat bcdi/utils.py\n".to_string()),
                    ..StepReport::not_executed(
                        0,
                        None,
                        "Check formatting with black",
                        "black --check bcdi",
                        StepStatus::Failed,
                    )
                }],
                started_at: Utc::now(),
                duration_ms: 500,
            }],
        }
    }

    #[test]
    fn test_write_report_creates_valid_json() {
        let temp_dir = TempDir::new().unwrap();
        let report_path = temp_dir.path().join("reports/run.json");
        let report = create_test_report();

        write_report(&report, &report_path).unwrap();

        let content = std::fs::read_to_string(&report_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["workflow"], "Python package");
        assert_eq!(parsed["status"], "failed");
        assert_eq!(parsed["runs"][0]["first_failure"], 0);
        assert_eq!(parsed["runs"][0]["steps"][0]["exit_code"], 1);
        assert_eq!(parsed["runs"][0]["matrix"]["python-version"], "3.9");
    }

    #[test]
    fn test_report_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let report_path = temp_dir.path().join("report.json");
        let report = create_test_report();
        write_report(&report, &report_path).unwrap();

        let content = std::fs::read_to_string(&report_path).unwrap();
        assert!(content.contains('\n'), "Report should be pretty printed");
        let parsed: WorkflowReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_write_report_invalid_path() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let report = create_test_report();
        let result = write_report(&report, &blocker.join("report.json"));
        assert!(result.is_err());
    }
}
