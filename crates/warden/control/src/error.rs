//! Error types for command-facing operations

use thiserror::Error;
use warden_index::{IndexError, StorageError};
use warden_migration::MigrationError;
use warden_supervisor::SupervisorError;
use warden_types::RegionError;

/// Control layer error type
#[derive(Debug, Error)]
pub enum ControlError {
    /// Region support is switched off for the world
    #[error("Region support is disabled in world '{0}'")]
    RegionsDisabled(String),

    /// No region contains the actor's position
    #[error("You are not standing in a region")]
    NotInRegion,

    /// Several regions contain the actor's position
    #[error("Several regions here: {}", .0.join(", "))]
    AmbiguousRegion(Vec<String>),

    #[error("You already own {max} region(s), the most allowed")]
    ClaimLimit { max: u64 },

    #[error("The claim overlaps a region you do not own")]
    ClaimOverlap,

    #[error("Claims must be made inside an existing region")]
    ClaimOutsideRegions,

    #[error("Claim of {volume} blocks exceeds the limit of {max}")]
    ClaimTooLarge { volume: u64, max: u64 },

    #[error("Polygon claims are not supported")]
    PolygonClaim,

    /// The region sets no location for the requested teleport
    #[error("Region '{0}' has no location to teleport to")]
    NoTeleportLocation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No profile is running")]
    NoActiveProfile,

    /// Configuration could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
