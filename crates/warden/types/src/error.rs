//! Error types for region model validation

use crate::flags::FlagKind;
use thiserror::Error;

/// Validation errors raised while building regions, shapes and flag values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// Shape is degenerate or otherwise unusable
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Region id contains characters outside the allowed set
    #[error("Invalid region id '{0}'")]
    InvalidId(String),

    /// Region id is reserved for the global region
    #[error("Region id '{0}' is reserved")]
    ReservedId(String),

    /// Flag is not known to the registry
    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),

    /// Flag value does not match the flag's declared kind
    #[error("Flag '{flag}' expects a {expected} value, got {actual}")]
    InvalidFlagValue {
        flag: String,
        expected: FlagKind,
        actual: FlagKind,
    },

    /// Flag name is already registered
    #[error("Flag '{0}' is already registered")]
    DuplicateFlag(String),

    /// Flag has no companion group flag
    #[error("Flag '{0}' has no group flag")]
    NoGroupFlag(String),

    /// Input could not be parsed into a typed value
    #[error("Invalid input for '{flag}': {reason}")]
    InvalidInput { flag: String, reason: String },
}

/// Result type for region model operations
pub type Result<T> = std::result::Result<T, RegionError>;
