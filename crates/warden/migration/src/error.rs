//! Migration errors and reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use warden_index::StorageError;
use warden_types::RegionId;

/// One region that could not be migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub world: String,
    /// `None` when the stored record could not be decoded
    pub region: Option<RegionId>,
    pub reason: String,
}

/// What a migration did, region by region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Worlds visited, in order
    pub worlds: Vec<String>,
    /// Regions written to the destination
    pub migrated: Vec<(String, RegionId)>,
    pub failures: Vec<RecordFailure>,
    /// Regions left unmigrated because the run was cancelled, or because
    /// their world was left unchanged after an undecodable record
    pub skipped: Vec<(String, RegionId)>,
    /// Player names that could not be mapped to ids
    pub unresolved: BTreeSet<String>,
    pub cancelled: bool,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Migration error type
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Some regions failed; the destination holds every other region
    #[error("Migration finished with {} failed region(s)", .report.failures.len())]
    Partial { report: Box<MigrationReport> },

    /// Reading or writing a store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Names could not be resolved and the policy rejects that
    #[error("Could not resolve {} player name(s)", .0.len())]
    UnresolvedIdentity(Vec<String>),

    /// The run was cancelled; the report lists what was completed
    #[error("Migration cancelled after {} region(s)", .report.migrated.len())]
    Cancelled { report: Box<MigrationReport> },

    /// The name resolver failed
    #[error("Profile lookup failed: {0}")]
    Resolver(String),
}

impl MigrationError {
    /// Report attached to partial and cancelled outcomes.
    pub fn report(&self) -> Option<&MigrationReport> {
        match self {
            MigrationError::Partial { report } | MigrationError::Cancelled { report } => {
                Some(report)
            }
            _ => None,
        }
    }
}

/// Result type for migrations
pub type Result<T> = std::result::Result<T, MigrationError>;
