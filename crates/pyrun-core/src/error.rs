//! Caller-facing error taxonomy
//!
//! Everything here is safe to show verbatim: messages never carry host paths
//! or the pipeline's own stack. Detail for operators goes to the log.

use pyrun_store::StoreError;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("No code provided")]
    EmptySource,

    #[error("Source exceeds the maximum size of {limit} bytes")]
    SourceTooLarge { limit: usize },

    #[error("Potentially unsafe code detected: {pattern}")]
    RejectedBySafetyFilter { pattern: String },

    /// Sanitized compiler diagnostic
    #[error("{0}")]
    SyntaxError(String),

    #[error("Execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unit {0} is in use")]
    UnitInUse(String),

    #[error("Internal error")]
    InternalFailure,
}

impl PipelineError {
    /// Collapse a storage failure; I/O detail is logged, not returned
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(id) => PipelineError::UnknownUnit(id),
            StoreError::NotFound(id) => PipelineError::UnknownUnit(id.to_string()),
            StoreError::InUse(id) => PipelineError::UnitInUse(id.to_string()),
            other => {
                error!(error = %other, "storage failure");
                PipelineError::InternalFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrun_store::UnitId;

    #[test]
    fn test_store_errors_are_collapsed() {
        let id = UnitId::generate();
        assert_eq!(
            PipelineError::from_store(StoreError::NotFound(id)),
            PipelineError::UnknownUnit(id.to_string())
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire at /var/lib/x");
        let err = PipelineError::from_store(StoreError::Io(io));
        assert_eq!(err, PipelineError::InternalFailure);
        assert_eq!(err.to_string(), "Internal error");
    }
}
