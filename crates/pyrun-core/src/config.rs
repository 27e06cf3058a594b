//! Runtime configuration
//!
//! Defaults, then `~/.pyrun/config.json` if present, then `PYRUN_*`
//! environment variables. The CLI applies its flags last.

use pyrun_sandbox::{Capability, SafetyFilter, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot use storage root {path}: {source}")]
    Root {
        path: PathBuf,
        source: pyrun_store::StoreError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PyrunConfig {
    /// Directory units are materialized beneath
    pub root: PathBuf,
    /// Python interpreter
    pub interpreter: PathBuf,
    /// Deadline for one syntax check or run
    pub timeout_secs: u64,
    /// Cap on captured bytes per output stream
    pub max_output_bytes: usize,
    /// Largest accepted snippet
    pub max_source_bytes: usize,
    /// Age after which a unit is reclaimable
    pub retention_minutes: i64,
    /// Background sweep period
    pub sweep_interval_secs: u64,
    /// Default blocklist entries to drop (e.g. `"open("`)
    pub permit_patterns: Vec<String>,
    /// Extra blocklist entries, appended after the defaults
    pub block_patterns: Vec<String>,
}

impl Default for PyrunConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("pyrun"),
            interpreter: PathBuf::from("python3"),
            timeout_secs: 10,
            max_output_bytes: 64 * 1024,
            max_source_bytes: 1024 * 1024, // 1MB
            retention_minutes: pyrun_store::DEFAULT_RETENTION_MINUTES,
            sweep_interval_secs: 60,
            permit_patterns: Vec::new(),
            block_patterns: Vec::new(),
        }
    }
}

impl PyrunConfig {
    /// `~/.pyrun/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".pyrun").join("config.json"))
    }

    /// Load from the default location (if it exists) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var_os(key))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `PYRUN_ROOT`, `PYRUN_PYTHON` and `PYRUN_TIMEOUT_SECS`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(root) = lookup("PYRUN_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(python) = lookup("PYRUN_PYTHON") {
            self.interpreter = PathBuf::from(python);
        }
        if let Some(timeout) = lookup("PYRUN_TIMEOUT_SECS") {
            self.timeout_secs = timeout
                .to_str()
                .and_then(|t| t.trim().parse().ok())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!("PYRUN_TIMEOUT_SECS={timeout:?} is not a number"))
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.max_source_bytes == 0 {
            return Err(ConfigError::Invalid("max_source_bytes must be positive".into()));
        }
        if self.retention_minutes < 0 {
            return Err(ConfigError::Invalid("retention_minutes cannot be negative".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn sandbox(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.retention_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Default blocklist adjusted by `permit_patterns` / `block_patterns`
    pub fn safety_filter(&self) -> SafetyFilter {
        let mut filter = SafetyFilter::default();
        for pattern in &self.permit_patterns {
            filter.permit(pattern);
        }
        for pattern in &self.block_patterns {
            filter.block(pattern, Capability::Custom);
        }
        filter
    }
}
