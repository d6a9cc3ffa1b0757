//! Step Command Runner
//!
//! Spawns a step's shell, streams its stdout and stderr line by line into
//! step output events while capturing them, and enforces the step timeout
//! and external cancellation.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use stepwise_events::{Stream, emit_step_output};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How long to keep draining output after the child was killed; orphaned
/// grandchildren may hold the pipes open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Error types for step execution
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Command is empty
    #[error("Step '{step}' has an empty command")]
    EmptyCommand { step: String },

    /// Unknown `shell:` value
    #[error("Unsupported shell '{shell}': use bash, sh, python or a template containing {{0}}")]
    UnsupportedShell { shell: String },

    /// The script file for a custom shell could not be written
    #[error("Failed to write script file {}: {source}", path.display())]
    ScriptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Process spawn failed
    #[error("Failed to spawn step '{step}' ({program}): {source}")]
    SpawnFailed {
        step: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed
    #[error("Step '{step}' execution failed: {source}")]
    ExecutionFailed {
        step: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fully resolved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Step display name, for output events
    pub step: String,
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment
    pub env: IndexMap<String, String>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

/// Output from step execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed or terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Killed after exceeding the timeout
    pub timed_out: bool,
    /// Killed by cancellation
    pub cancelled: bool,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the process exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }

    /// Stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        if !combined.is_empty() && !combined.ends_with('\n') && !self.stderr.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }
}

/// Executes step commands.
///
/// The process runner is the production implementation; tests substitute
/// scripted runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion, timeout or cancellation.
    ///
    /// # Errors
    /// Returns error if the command cannot be started or awaited
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

enum Finished {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    #[tracing::instrument(
        name = "run_step_command",
        fields(step = %spec.step, program = %spec.program),
        skip(self, spec, cancel)
    )]
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunnerError> {
        if spec.program.is_empty() {
            return Err(RunnerError::EmptyCommand {
                step: spec.step.clone(),
            });
        }

        let start = Instant::now();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RunnerError::SpawnFailed {
            step: spec.step.clone(),
            program: spec.program.clone(),
            source,
        })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(capture(out, spec.step.clone(), Stream::Stdout)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, spec.step.clone(), Stream::Stderr)));

        let timeout = async {
            match spec.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let finished = tokio::select! {
            status = child.wait() => Finished::Exited(status.map_err(|source| RunnerError::ExecutionFailed {
                step: spec.step.clone(),
                source,
            })?),
            () = timeout => Finished::TimedOut,
            () = cancel.cancelled() => Finished::Cancelled,
        };

        let killed = !matches!(finished, Finished::Exited(_));
        if killed {
            tracing::debug!(step = %spec.step, "Killing step process");
            if let Err(error) = child.kill().await {
                tracing::warn!(step = %spec.step, %error, "Failed to kill step process");
            }
        }

        let stdout = join_capture(stdout_task, killed).await;
        let stderr = join_capture(stderr_task, killed).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let output = match finished {
            Finished::Exited(status) => CommandOutput {
                exit_code: status.code(),
                stdout,
                stderr,
                duration_ms,
                ..CommandOutput::default()
            },
            Finished::TimedOut => CommandOutput {
                stdout,
                stderr,
                timed_out: true,
                duration_ms,
                ..CommandOutput::default()
            },
            Finished::Cancelled => CommandOutput {
                stdout,
                stderr,
                cancelled: true,
                duration_ms,
                ..CommandOutput::default()
            },
        };

        tracing::info!(
            step = %spec.step,
            exit_code = ?output.exit_code,
            success = output.success(),
            timed_out = output.timed_out,
            cancelled = output.cancelled,
            duration_ms,
            "Step command completed"
        );
        Ok(output)
    }
}

async fn capture<R>(reader: R, step: String, stream: Stream) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                emit_step_output!(step, stream, line.trim_end_matches(['\n', '\r']));
                captured.push_str(&line);
            }
            Err(error) => {
                tracing::debug!(step = %step, %error, "Output stream closed");
                break;
            }
        }
    }
    captured
}

async fn join_capture(task: Option<tokio::task::JoinHandle<String>>, killed: bool) -> String {
    let Some(task) = task else {
        return String::new();
    };
    if killed {
        let abort = task.abort_handle();
        match tokio::time::timeout(DRAIN_GRACE, task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                abort.abort();
                String::new()
            }
        }
    } else {
        task.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(step: &str, script: &str, cwd: &std::path::Path) -> CommandSpec {
        CommandSpec {
            step: step.to_string(),
            program: "sh".to_string(),
            args: vec!["-e".to_string(), "-c".to_string(), script.to_string()],
            cwd: cwd.to_path_buf(),
            env: IndexMap::new(),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let tmp = TempDir::new().unwrap();
        let spec = sh("echo", "echo hello; echo oops >&2", tmp.path());
        let output = ProcessRunner.run(&spec, &CancellationToken::new()).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
        assert_eq!(output.combined(), "hello\noops\n");
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let tmp = TempDir::new().unwrap();
        let mut spec = sh("env", "printf '%s' \"$MY_VAR\"; pwd >&2", tmp.path());
        spec.env.insert("MY_VAR".to_string(), "test_value".to_string());
        let output = ProcessRunner.run(&spec, &CancellationToken::new()).await.unwrap();
        assert_eq!(output.stdout, "test_value");
        let reported = std::fs::canonicalize(output.stderr.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(tmp.path()).unwrap());
    }

    #[tokio::test]
    async fn test_failing_command() {
        let tmp = TempDir::new().unwrap();
        let output = ProcessRunner
            .run(&sh("fail", "exit 3", tmp.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let tmp = TempDir::new().unwrap();
        let mut spec = sh("slow", "exec sleep 30", tmp.path());
        spec.timeout = Some(Duration::from_millis(200));
        let output = ProcessRunner.run(&spec, &CancellationToken::new()).await.unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
        assert!(output.duration_ms < 10_000);
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let tmp = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
        let output = ProcessRunner
            .run(&sh("slow", "exec sleep 30", tmp.path()), &token)
            .await
            .unwrap();
        assert!(output.cancelled);
        assert_eq!(output.exit_code, None);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let tmp = TempDir::new().unwrap();
        let mut spec = sh("missing", "", tmp.path());
        spec.program = "definitely-not-a-real-shell".to_string();
        let result = ProcessRunner.run(&spec, &CancellationToken::new()).await;
        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_empty_command_error() {
        let tmp = TempDir::new().unwrap();
        let mut spec = sh("empty", "", tmp.path());
        spec.program = String::new();
        let result = ProcessRunner.run(&spec, &CancellationToken::new()).await;
        assert!(matches!(result, Err(RunnerError::EmptyCommand { .. })));
    }
}
