//! Program execution with timeout enforcement and output capture.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{classify_outcome, field_coverage, ExecutionResult};
use crate::workspace::ProjectWorkspace;

use super::error::{SandboxError, SandboxResult};

/// Cap on extracted diagnostic lines per run.
const MAX_DIAGNOSTIC_LINES: usize = 40;

/// Abstraction over "run the current candidate and classify the outcome".
///
/// The repair loop and the release runner both go through this trait;
/// tests substitute scripted implementations.
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    /// Execute the program currently written into `project`.
    ///
    /// `timeout` bounds wall-clock time (testing mode); `None` runs
    /// unbounded (release mode). Diagnostics are captured even when the
    /// run is force-terminated.
    async fn run(
        &self,
        project: &ProjectWorkspace,
        generation: u32,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecutionResult>;
}

/// Configuration for the process-backed sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Command prefix (first element is the executable).
    pub command: Vec<String>,

    /// Whether to append the project's spider name as the final argument.
    pub pass_spider_name: bool,

    /// Field-completeness threshold for `success` classification.
    pub threshold: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: vec!["scrapy".to_string(), "crawl".to_string()],
            pass_spider_name: true,
            threshold: 1.0,
        }
    }
}

/// Child-process execution sandbox.
pub struct ProcessSandbox {
    config: RunnerConfig,
}

impl ProcessSandbox {
    pub fn new(config: RunnerConfig) -> SandboxResult<Self> {
        if config.command.is_empty() {
            return Err(SandboxError::InvalidConfig(
                "runner command must not be empty".to_string(),
            ));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl ProgramRunner for ProcessSandbox {
    async fn run(
        &self,
        project: &ProjectWorkspace,
        generation: u32,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecutionResult> {
        project
            .clear_records()
            .map_err(|e| SandboxError::Workspace(e.to_string()))?;

        let start = Instant::now();

        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..]);
        if self.config.pass_spider_name {
            cmd.arg(project.spider_name());
        }
        cmd.current_dir(project.root())
            .env("PYTHONPATH", project.root())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SandboxError::EnvironmentUnavailable {
            reason: format!("failed to spawn {}: {e}", self.config.command[0]),
        })?;

        // Drain pipes concurrently with the wait so a chatty child cannot
        // fill the pipe buffer and stall.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(drain(stdout_pipe));
        let stderr_task = tokio::spawn(drain(stderr_pipe));

        let (status, timed_out) = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => (status?, false),
                Err(_elapsed) => {
                    warn!(
                        event = "sandbox.timeout",
                        generation = generation,
                        limit_secs = limit.as_secs(),
                    );
                    child.start_kill().ok();
                    (child.wait().await?, true)
                }
            },
            None => (child.wait().await?, false),
        };

        let (stdout_buf, stderr_buf) =
            futures::future::try_join(flatten(stdout_task), flatten(stderr_task)).await?;
        let stdout = String::from_utf8_lossy(&stdout_buf);
        let stderr = String::from_utf8_lossy(&stderr_buf);

        project
            .save_logs(generation, &stdout, &stderr)
            .map_err(|e| SandboxError::Workspace(e.to_string()))?;

        let mut diagnostics = extract_error_lines(&stdout, &stderr);
        let fatal_errors = diagnostics.len();

        let records = project
            .read_records()
            .map_err(|e| SandboxError::Workspace(e.to_string()))?;
        let (field_population, coverage) = field_coverage(&records, project.fields());

        let outcome = classify_outcome(
            records.len() as u64,
            coverage,
            fatal_errors,
            self.config.threshold,
        );

        if timed_out {
            diagnostics.push(format!(
                "execution timed out after {}s and was terminated; output below reflects the partial run",
                start.elapsed().as_secs()
            ));
        }

        let result = ExecutionResult {
            generation,
            exit_code: if timed_out { None } else { status.code() },
            records: records.len() as u64,
            field_population,
            coverage,
            diagnostics,
            timed_out,
            duration_ms: start.elapsed().as_millis() as u64,
            outcome,
        };

        debug!(
            event = "sandbox.run_finished",
            generation = generation,
            outcome = result.outcome.as_str(),
            records = result.records,
            coverage = result.coverage,
            timed_out = result.timed_out,
        );

        Ok(result)
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn flatten(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> std::io::Result<Vec<u8>> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
    }
}

/// Pull error lines and stack traces out of the captured streams.
///
/// Scrapy logs errors as `ERROR`/`CRITICAL` lines on stderr; Python stack
/// traces start with `Traceback`. Capped at [`MAX_DIAGNOSTIC_LINES`].
fn extract_error_lines(stdout: &str, stderr: &str) -> Vec<String> {
    const MARKERS: [&str; 5] = ["Traceback", "ERROR", "CRITICAL", "Exception", "panicked at"];

    stdout
        .lines()
        .chain(stderr.lines())
        .filter(|line| MARKERS.iter().any(|m| line.contains(m)))
        .map(|line| line.trim().to_string())
        .take(MAX_DIAGNOSTIC_LINES)
        .collect()
}
