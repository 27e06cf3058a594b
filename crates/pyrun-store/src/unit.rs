//! Unit identity and the read-only handle downstream stages work with

use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Collision-free unit identifier, rendered as 32 lowercase hex digits.
///
/// Also the unit's directory name, so parsing is strict: anything that is not
/// exactly that shape (`..`, separators, hyphenated UUIDs) is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(Uuid);

impl UnitId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for UnitId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == 32
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(StoreError::InvalidId(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| StoreError::InvalidId(s.to_string()))
    }
}

impl TryFrom<String> for UnitId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.to_string()
    }
}

/// One submitted snippet. Immutable once materialized.
#[derive(Debug, Clone, Serialize)]
pub struct SourceUnit {
    id: UnitId,
    #[serde(skip)]
    source: String,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    path: PathBuf,
}

impl SourceUnit {
    pub(crate) fn new(id: UnitId, source: String, created_at: DateTime<Utc>, path: PathBuf) -> Self {
        Self {
            id,
            source,
            created_at,
            path,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Backing file. Host path: keep it away from callers.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the unit lives in (its import root)
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = UnitId::generate();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<UnitId>().unwrap(), id);
    }

    #[test]
    fn test_rejects_malformed_ids() {
        for bad in [
            "",
            "..",
            "../../etc/passwd",
            "4f1c",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "67E5504410B1426F9247BB680E5FE0C8",
            "67e5504410b1426f9247bb680e5fe0c/",
        ] {
            assert!(
                matches!(bad.parse::<UnitId>(), Err(StoreError::InvalidId(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_serializes_as_string() {
        let id: UnitId = "67e5504410b1426f9247bb680e5fe0c8".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"67e5504410b1426f9247bb680e5fe0c8\"");
    }
}
