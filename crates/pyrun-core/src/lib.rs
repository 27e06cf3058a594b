//! Pyrun Core - the submit / check / run / reclaim pipeline
//!
//! Shared by every pyrun frontend. Wires the safety filter, the artifact
//! store, the syntax validator and the execution engine together and turns
//! their failures into caller-safe errors.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod sweeper;

pub use config::{ConfigError, PyrunConfig};
pub use error::PipelineError;
pub use pipeline::{CompileResult, Pipeline};
pub use sweeper::Sweeper;

pub use pyrun_sandbox::ExecutionResult;
pub use pyrun_store::{SourceUnit, SweepReport, UnitId};
