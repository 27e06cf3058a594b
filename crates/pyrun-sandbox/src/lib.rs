//! Pyrun Sandbox - screening, syntax checks and interpreter runs
//!
//! Three stages stand between a snippet and its output:
//! 1. [`SafetyFilter`] - a textual blocklist. Cheap, and easy to bypass.
//! 2. [`SyntaxValidator`] - compile without executing.
//! 3. [`ExecutionEngine`] - one fresh interpreter process per run, bound to a
//!    deadline, with its diagnostics redacted by the [`Sanitizer`].
//!
//! None of this is OS-level containment. The child runs with the caller's
//! user, filesystem and network; there is no memory ceiling. Real deployments
//! need a jail, seccomp profile or VM underneath.

mod capabilities;
mod driver;
mod engine;
mod filter;
mod runtime;
mod sanitize;
mod validator;

pub use capabilities::Capability;
pub use engine::{ExecutionEngine, ExecutionResult};
pub use filter::{BlockedPattern, Rejected, SafetyFilter, DEFAULT_PATTERNS};
pub use runtime::SandboxConfig;
pub use sanitize::{sanitize, DiagnosticKind, Sanitizer};
pub use validator::{SyntaxValidator, ValidationError};

/// Errors from sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to start interpreter: {0}")]
    SpawnFailed(String),

    #[error("Script file is missing")]
    MissingScript,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
