//! Compile-only syntax check

use crate::driver::{self, EXIT_SYNTAX_ERROR, EXIT_UNREADABLE};
use crate::runtime::{self, SandboxConfig};
use crate::sanitize::DiagnosticKind;
use crate::SandboxError;
use std::path::Path;
use tracing::{debug, warn};

/// Why a unit did not pass the syntax check
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// `compile` rejected the source; the message is already sanitized
    #[error("{0}")]
    Syntax(String),

    /// The check itself could not be carried out
    #[error("Syntax check failed: {0}")]
    Internal(#[from] SandboxError),
}

/// Parses and compiles a unit without running any of it
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    config: SandboxConfig,
}

impl SyntaxValidator {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub async fn validate(&self, script: &Path) -> Result<(), ValidationError> {
        runtime::ensure_script(script)?;

        let mut child = self
            .config
            .command(driver::CHECK_SYNTAX, script)
            .spawn()
            .map_err(runtime::spawn_failed)?;
        let pid = child.id();

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::SpawnFailed("stderr not captured".into()))?;
        let mut stderr_task =
            tokio::spawn(runtime::read_capped(stderr, self.config.max_output_bytes));

        let finished = tokio::time::timeout(self.config.timeout, async {
            let status = child.wait().await?;
            let captured = (&mut stderr_task)
                .await
                .map_err(|e| SandboxError::SpawnFailed(e.to_string()))??;
            Ok::<_, SandboxError>((status, captured))
        })
        .await;

        let (status, raw) = match finished {
            Ok(outcome) => {
                let (status, captured) = outcome?;
                (status, captured.into_text())
            }
            Err(_) => {
                warn!(script = %script.display(), "syntax check timed out");
                runtime::kill_tree(&mut child, pid).await;
                stderr_task.abort();
                return Err(SandboxError::Timeout(self.config.timeout_ms()).into());
            }
        };

        match status.code() {
            Some(0) => Ok(()),
            Some(EXIT_SYNTAX_ERROR) => {
                let message =
                    runtime::sanitizer_for(script).sanitize(&raw, DiagnosticKind::SyntaxError);
                debug!(script = %script.display(), "syntax error reported");
                Err(ValidationError::Syntax(message.trim_end().to_string()))
            }
            Some(EXIT_UNREADABLE) => {
                warn!(script = %script.display(), error = %raw.trim_end(), "checker could not read unit");
                Err(SandboxError::MissingScript.into())
            }
            _ => {
                warn!(%status, "syntax checker exited unexpectedly");
                Err(SandboxError::SpawnFailed(format!("checker exited with {status}")).into())
            }
        }
    }
}
