//! Capability classes the safety screen refuses to hand to a snippet
//!
//! Every blocked pattern names the capability it stands for, so a rejection
//! can say *what* was refused and not only which text matched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A capability considered dangerous for unrestricted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Spawning processes or shell commands
    ProcessSpawn,
    /// `eval` / `exec` of strings built at runtime
    DynamicEvaluation,
    /// Importing modules by computed name
    DynamicImport,
    /// Reading or writing arbitrary files
    FileIo,
    /// Reflective access to the global or local scope
    ScopeReflection,
    /// Compiling new code objects from inside the snippet
    Recompilation,
    /// Anything added by configuration without a better class
    Custom,
}

impl Capability {
    pub fn describe(&self) -> &'static str {
        match self {
            Capability::ProcessSpawn => "process spawning",
            Capability::DynamicEvaluation => "dynamic evaluation",
            Capability::DynamicImport => "dynamic import",
            Capability::FileIo => "file I/O",
            Capability::ScopeReflection => "scope reflection",
            Capability::Recompilation => "re-compilation",
            Capability::Custom => "custom rule",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}
