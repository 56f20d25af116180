//! Warden Index - Per-world region storage and spatial queries
//!
//! The [`RegionIndex`] owns every region of one world and is the only way
//! to mutate them. Mutations publish a new immutable [`RegionSet`]; queries
//! run against whichever snapshot was current when they started, so a flag
//! lookup never observes a half-applied change.
//!
//! ## Queries
//!
//! - [`RegionIndex::applicable_regions`] for a block position
//! - [`RegionIndex::applicable_regions_for`] for overlap checks against a shape
//!
//! Both return an [`ApplicableRegionSet`] ordered by effective priority
//! (highest first) with insertion order breaking ties.
//!
//! ## Storage
//!
//! The [`storage`] module defines [`RegionDriver`] / [`RegionStore`] and ships
//! memory, JSON lines and YAML backends. All file writes are atomic.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod applicable;
pub mod error;
mod grid;
pub mod index;
pub mod snapshot;
pub mod storage;

pub use applicable::ApplicableRegionSet;
pub use error::{IndexError, Result, StorageError, StorageResult};
pub use grid::{DEFAULT_CELL_SHIFT, MAX_CELLS_PER_REGION};
pub use index::{AddMode, RegionIndex, RemovalStrategy};
pub use snapshot::{RegionSet, MAX_PARENT_DEPTH};
pub use storage::{JsonDriver, MemoryDriver, MemoryStore, RecordWriter, RegionDriver, RegionStore, YamlDriver};
