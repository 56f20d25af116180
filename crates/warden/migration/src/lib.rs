//! Warden Migration - One-off transformations of stored regions
//!
//! Three migrations are provided:
//!
//! - [`DriverMigration`]: copy every world from one storage driver to another
//! - [`IdentityMigration`]: rekey name-based owners and members to player ids
//! - [`HeightMigration`]: move region Y bounds to a new world height range
//!
//! Migrations stream records one at a time, check for cancellation between
//! records and never write part of a record. They are not transactional
//! across a whole store: the [`MigrationReport`] says what happened to each
//! region.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod driver;
mod engine;
pub mod error;
pub mod heights;
pub mod identity;

pub use driver::DriverMigration;
pub use error::{MigrationError, MigrationReport, RecordFailure, Result};
pub use heights::{HeightMigration, HeightRange, HeightStrategy};
pub use identity::{IdentityMigration, ProfileResolver, StaticResolver, UnresolvedPolicy};

use std::sync::Arc;
use warden_index::RegionDriver;
use warden_supervisor::CancelToken;

/// Records staged per flush when copying between drivers
pub const DEFAULT_FLUSH_BATCH: usize = 256;

/// A runnable migration
pub trait Migration: Send + Sync {
    /// Short name for logs and task descriptions.
    fn name(&self) -> &str;

    /// Run to completion, or until `cancel` fires.
    ///
    /// Returns `Partial` when some regions failed and `Cancelled` when the
    /// run stopped early; both carry the report.
    fn run(&self, cancel: &CancelToken) -> Result<MigrationReport>;
}

/// Worlds to migrate: the explicit list, or everything the driver has.
pub(crate) fn target_worlds(
    driver: &Arc<dyn RegionDriver>,
    only: &Option<Vec<String>>,
) -> Result<Vec<String>> {
    match only {
        Some(worlds) => Ok(worlds.clone()),
        None => Ok(driver.worlds()?),
    }
}

/// Turn a finished report into the migration outcome.
pub(crate) fn conclude(report: MigrationReport) -> Result<MigrationReport> {
    if report.cancelled {
        Err(MigrationError::Cancelled {
            report: Box::new(report),
        })
    } else if !report.failures.is_empty() {
        Err(MigrationError::Partial {
            report: Box::new(report),
        })
    } else {
        Ok(report)
    }
}
