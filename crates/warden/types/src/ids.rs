//! Strongly-typed identifiers for regions and players

use crate::error::{RegionError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Reserved id of the world-wide region
pub const GLOBAL_REGION: &str = "__global__";

/// Region identifier.
///
/// Case is preserved for display but ignored for equality, hashing and
/// ordering, so `Spawn` and `spawn` name the same region.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionId {
    raw: String,
    key: String,
}

impl RegionId {
    /// Parse and validate a region id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let raw = id.into();
        if !Self::is_valid(&raw) {
            return Err(RegionError::InvalidId(raw));
        }
        let key = raw.to_lowercase();
        Ok(Self { raw, key })
    }

    /// The id of the global region
    pub fn global() -> Self {
        Self {
            raw: GLOBAL_REGION.to_string(),
            key: GLOBAL_REGION.to_string(),
        }
    }

    /// Whether a string is usable as a region id.
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty()
            && id.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '_' | ',' | '\'' | '-' | '+' | '/')
            })
    }

    pub fn is_global(&self) -> bool {
        self.key == GLOBAL_REGION
    }

    /// The id as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lowercased lookup key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for RegionId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RegionId {}

impl Hash for RegionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for RegionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl TryFrom<String> for RegionId {
    type Error = RegionError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RegionId> for String {
    fn from(id: RegionId) -> Self {
        id.raw
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionId({})", self.raw)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Stable player identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
