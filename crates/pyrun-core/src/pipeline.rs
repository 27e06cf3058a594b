//! The four operations the outside world sees: submit, check, run, reclaim
//!
//! Each stage converts its own failures into [`PipelineError`] or a
//! structured result. Nothing from the pipeline's internals (I/O errors,
//! interpreter spawn failures, host paths) crosses this boundary; it is
//! logged and replaced with a generic message.

use crate::config::{ConfigError, PyrunConfig};
use crate::error::PipelineError;
use crate::sweeper::{self, Sweeper};
use chrono::{DateTime, Utc};
use pyrun_sandbox::{
    ExecutionEngine, ExecutionResult, SafetyFilter, SandboxError, SyntaxValidator, ValidationError,
};
use pyrun_store::{ArtifactStore, SourceUnit, SweepReport, UnitId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Diagnostic used when the syntax check itself could not run
pub const INTERNAL_DIAGNOSTIC: &str = "Internal error while checking syntax";

/// Outcome of a syntax check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub accepted: bool,
    /// Sanitized diagnostic when not accepted
    pub diagnostic: Option<String>,
}

impl CompileResult {
    fn accepted() -> Self {
        Self {
            accepted: true,
            diagnostic: None,
        }
    }

    fn rejected(diagnostic: impl Into<String>) -> Self {
        Self {
            accepted: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Screening, storage, validation and execution wired together
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PyrunConfig,
    store: ArtifactStore,
    filter: SafetyFilter,
    validator: SyntaxValidator,
    engine: ExecutionEngine,
}

impl Pipeline {
    pub fn new(config: PyrunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let store = ArtifactStore::open(&config.root, config.retention()).map_err(|source| {
            ConfigError::Root {
                path: config.root.clone(),
                source,
            }
        })?;
        let sandbox = config.sandbox();
        Ok(Self {
            filter: config.safety_filter(),
            validator: SyntaxValidator::new(sandbox.clone()),
            engine: ExecutionEngine::new(sandbox),
            store,
            config,
        })
    }

    pub fn config(&self) -> &PyrunConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn filter(&self) -> &SafetyFilter {
        &self.filter
    }

    /// Whether the configured interpreter can be started
    pub fn interpreter_available(&self) -> bool {
        self.engine.is_available()
    }

    /// Screen and materialize a snippet.
    ///
    /// Rejected source is never written to storage.
    pub fn submit(&self, source: &str) -> Result<SourceUnit, PipelineError> {
        if source.trim().is_empty() {
            return Err(PipelineError::EmptySource);
        }
        if source.len() > self.config.max_source_bytes {
            return Err(PipelineError::SourceTooLarge {
                limit: self.config.max_source_bytes,
            });
        }
        self.screen(source)?;

        let unit = self.store.materialize(source).map_err(PipelineError::from_store)?;
        info!(unit = %unit.id(), "snippet submitted");
        Ok(unit)
    }

    /// Re-open a unit by its textual id
    pub fn open(&self, id: &str) -> Result<SourceUnit, PipelineError> {
        let id: UnitId = id.parse().map_err(PipelineError::from_store)?;
        self.store.get(&id).map_err(PipelineError::from_store)
    }

    /// Compile-only check. Same unit, same answer.
    pub async fn check_syntax(&self, unit: &SourceUnit) -> CompileResult {
        let _lease = match self.store.lease(&unit.id()) {
            Ok(lease) => lease,
            Err(e) => {
                warn!(unit = %unit.id(), error = %e, "cannot lease unit for syntax check");
                return CompileResult::rejected(INTERNAL_DIAGNOSTIC);
            }
        };

        match self.validator.validate(unit.path()).await {
            Ok(()) => {
                debug!(unit = %unit.id(), "syntax ok");
                CompileResult::accepted()
            }
            Err(ValidationError::Syntax(message)) => {
                debug!(unit = %unit.id(), "syntax error");
                CompileResult::rejected(message)
            }
            Err(ValidationError::Internal(e)) => {
                error!(unit = %unit.id(), error = %e, "syntax check could not run");
                CompileResult::rejected(INTERNAL_DIAGNOSTIC)
            }
        }
    }

    /// Execute a unit. Never cached: every call is a fresh run.
    ///
    /// The unit is screened again first; the lease keeps the sweeper off it
    /// until the run is over.
    pub async fn run(&self, unit: &SourceUnit) -> Result<ExecutionResult, PipelineError> {
        self.screen(unit.source())?;
        let _lease = self.store.lease(&unit.id()).map_err(PipelineError::from_store)?;

        match self.engine.execute(unit.path()).await {
            Ok(result) => {
                info!(
                    unit = %unit.id(),
                    succeeded = result.succeeded,
                    duration_ms = result.duration_ms,
                    "run finished"
                );
                Ok(result)
            }
            Err(SandboxError::Timeout(limit_ms)) => {
                warn!(unit = %unit.id(), limit_ms, "run timed out");
                Err(PipelineError::Timeout { limit_ms })
            }
            Err(SandboxError::MissingScript) => Err(PipelineError::UnknownUnit(unit.id().to_string())),
            Err(e) => {
                error!(unit = %unit.id(), error = %e, "run failed inside the engine");
                Err(PipelineError::InternalFailure)
            }
        }
    }

    /// One-shot flow: submit, check, run, then drop the unit
    pub async fn evaluate(&self, source: &str) -> Result<ExecutionResult, PipelineError> {
        let unit = self.submit(source)?;
        let compiled = self.check_syntax(&unit).await;
        let outcome = if compiled.accepted {
            self.run(&unit).await
        } else {
            Err(PipelineError::SyntaxError(
                compiled.diagnostic.unwrap_or_default(),
            ))
        };
        if let Err(e) = self.store.discard(&unit.id()) {
            debug!(unit = %unit.id(), error = %e, "could not discard evaluated unit");
        }
        outcome
    }

    /// Explicitly destroy a unit
    pub fn discard(&self, id: &UnitId) -> Result<(), PipelineError> {
        self.store.discard(id).map_err(PipelineError::from_store)
    }

    /// Ids of every unit currently stored
    pub fn list(&self) -> Result<Vec<UnitId>, PipelineError> {
        self.store.list().map_err(PipelineError::from_store)
    }

    /// Reclaim every unit older than the retention window. Idempotent.
    pub fn reclaim(&self, now: DateTime<Utc>) -> SweepReport {
        self.store.sweep(now)
    }

    /// Start the background sweeper on the current tokio runtime
    pub fn spawn_sweeper(&self) -> Sweeper {
        sweeper::spawn(self.store.clone(), self.config.sweep_interval())
    }

    fn screen(&self, source: &str) -> Result<(), PipelineError> {
        self.filter.screen(source).map_err(|rejected| {
            warn!(
                pattern = %rejected.pattern,
                capability = %rejected.capability,
                "snippet rejected by safety filter"
            );
            PipelineError::RejectedBySafetyFilter {
                pattern: rejected.pattern,
            }
        })
    }
}
