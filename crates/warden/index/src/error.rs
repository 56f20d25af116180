//! Error types for the region index and its storage drivers

use std::path::PathBuf;
use thiserror::Error;
use warden_types::{RegionError, RegionId};

/// Persistence failure
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A stored record could not be decoded. `record` is the 1-based line
    /// for JSON lines files and the list position for YAML documents.
    #[error("Corrupt record {record} in {path}: {reason}")]
    Corrupt {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    /// World name cannot be mapped onto storage
    #[error("Invalid world name '{0}'")]
    InvalidWorld(String),

    /// The backend refused the write
    #[error("Write rejected: {0}")]
    WriteRejected(String),
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Region index error type
#[derive(Debug, Error)]
pub enum IndexError {
    /// Insert of an id that already exists
    #[error("Region '{0}' already exists")]
    DuplicateId(RegionId),

    /// Region does not exist
    #[error("Region '{0}' not found")]
    NotFound(RegionId),

    /// Parent assignment would create a cycle
    #[error("Setting '{parent}' as parent of '{child}' would create circular inheritance")]
    CircularInheritance { child: RegionId, parent: RegionId },

    /// Only regular regions have parents
    #[error("The global region cannot have a parent")]
    GlobalParent,

    /// Region model validation error
    #[error(transparent)]
    Region(#[from] RegionError),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;
