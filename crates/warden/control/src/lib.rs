//! Warden Control - Command-facing region operations
//!
//! Hosts create one [`RegionContainer`] per process from a [`WardenConfig`].
//! The container keeps a [`RegionIndex`](warden_index::RegionIndex) per
//! world and exposes what a command layer needs:
//!
//! - Queries: regions and flag values at a point, region info, listings
//!   and teleport destinations
//! - Edits: define, redefine, claim, remove, flags, priority, parent,
//!   owners and members
//! - Persistence and migrations as supervised tasks
//! - A single-slot sampling profiler
//!
//! Results are plain data; formatting for players is left to the caller.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod profile;
pub mod telemetry;

pub use commands::{
    DomainEntry, DomainRole, FlagChange, ListEntry, ListFilter, ListPage, RegionInfo,
    TeleportKind, LIST_PAGE_SIZE,
};
pub use config::{DriverKind, RegionSettings, StorageConfig, WardenConfig, WorldOverrides};
pub use container::RegionContainer;
pub use error::{ControlError, Result};
pub use profile::ProfileRequest;
pub use telemetry::init_tracing;
