//! Execution engine - one interpreter process per run
//!
//! Every call gets a new process: fresh `__main__` namespace, no state from
//! earlier runs, `sys.path[0]` pointing at the unit's own directory. Output
//! is captured through pipes; uncaught exceptions come back through a report
//! file in a scratch directory that is removed however the call ends.

use crate::driver;
use crate::runtime::{self, SandboxConfig};
use crate::sanitize::DiagnosticKind;
use crate::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// What one run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Sanitized traceback of the uncaught exception, if any
    pub exception: Option<String>,
    pub succeeded: bool,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// The runtime exception, when the run raised one
    pub fn runtime_exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }
}

/// Runs units in fresh interpreter processes under a deadline
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    config: SandboxConfig,
}

impl ExecutionEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        self.config.interpreter_available()
    }

    /// Execute `script`. Never re-raises what the snippet raised; that ends up
    /// in [`ExecutionResult::exception`]. `Err` is reserved for failures of
    /// the engine itself and for the deadline.
    pub async fn execute(&self, script: &Path) -> Result<ExecutionResult> {
        runtime::ensure_script(script)?;

        // dropped on every path out of this function, report file included
        let scratch = tempfile::Builder::new().prefix("pyrun-run-").tempdir()?;
        let report_path = scratch.path().join("exception.txt");

        let started = Instant::now();
        let mut child = self
            .config
            .command(driver::RUN_UNIT, script)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(runtime::spawn_failed)?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\n", report_path.display());
            // a snippet that exits before reading stdin closes the pipe early
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                debug!(error = %e, "stdin closed before report path was written");
            }
        }

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return Err(SandboxError::SpawnFailed("output pipes not captured".into())),
        };
        let limit = self.config.max_output_bytes;
        let mut stdout_task = tokio::spawn(runtime::read_capped(stdout, limit));
        let mut stderr_task = tokio::spawn(runtime::read_capped(stderr, limit));

        // Descendants inherit the pipes, so the run is only over once both
        // streams hit EOF. The deadline covers that too.
        let join = |e: tokio::task::JoinError| SandboxError::SpawnFailed(e.to_string());
        let finished = tokio::time::timeout(self.config.timeout, async {
            let status = child.wait().await?;
            let stdout = (&mut stdout_task).await.map_err(join)??;
            let stderr = (&mut stderr_task).await.map_err(join)??;
            Ok::<_, SandboxError>((status, stdout, stderr))
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(
                    script = %script.display(),
                    limit_ms = self.config.timeout_ms(),
                    "execution hit its deadline, killing"
                );
                runtime::kill_tree(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(SandboxError::Timeout(self.config.timeout_ms()));
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let stdout = stdout.into_text();
        let stderr = stderr.into_text();

        let sanitizer = runtime::sanitizer_for(script);
        let report = match tokio::fs::read(&report_path).await {
            Ok(bytes) if !bytes.is_empty() => Some(String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        };

        let exception = match report {
            Some(raw) => Some(sanitizer.sanitize(&raw, DiagnosticKind::Traceback)),
            None if status.success() => None,
            None => Some(format!("Process exited abnormally ({status})")),
        };
        let succeeded = exception.is_none();

        debug!(
            script = %script.display(),
            succeeded,
            duration_ms,
            stdout_bytes = stdout.len(),
            "execution finished"
        );

        Ok(ExecutionResult {
            stdout,
            stderr: sanitizer.scrub(&stderr),
            exception,
            succeeded,
            duration_ms,
        })
    }
}
