//! Warden Types - Core types for region protection
//!
//! Warden grants or denies actions inside spatially-defined regions of a
//! shared world. This crate holds the plain data model every other Warden
//! crate builds on.
//!
//! ## Key Concepts
//!
//! - **Shape**: Cuboid, extruded polygon, or the world-wide global shape
//! - **Region**: Named shape with priority, parent, owners, members and flags
//! - **Domain**: Set of players (by id or legacy name) and groups
//! - **Flag**: Typed policy value, optionally scoped by a group selector
//!
//! Regions are values; the region index owns the published copies.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod domain;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod ids;
pub mod region;

pub use domain::{Actor, Association, Domain};
pub use error::{RegionError, Result};
pub use flags::{
    FlagDefinition, FlagKind, FlagRegistry, FlagValue, GroupFlag, Location, RegionGroup,
    StateValue,
};
pub use geometry::{BlockPoint, Cuboid, Point2, Polygon, Shape};
pub use ids::{PlayerId, RegionId, GLOBAL_REGION};
pub use region::Region;
