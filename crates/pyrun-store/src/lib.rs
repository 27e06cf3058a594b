//! Pyrun Store - where submitted snippets live between stages
//!
//! Every snippet is materialized under a random id, read many times, never
//! rewritten, and reclaimed once it outlives the retention window.

mod store;
mod unit;

pub use store::{ArtifactStore, SweepReport, UnitLease, DEFAULT_RETENTION_MINUTES, SOURCE_FILE};
pub use unit::{SourceUnit, UnitId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid unit id: {0:?}")]
    InvalidId(String),

    #[error("Unit not found: {0}")]
    NotFound(UnitId),

    #[error("Unit {0} is in use")]
    InUse(UnitId),

    #[error("Could not allocate a unique unit id")]
    IdExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
