//! Store-to-store migration

use crate::engine::{Step, WorldPass};
use crate::error::{MigrationReport, Result};
use crate::{conclude, target_worlds, Migration, DEFAULT_FLUSH_BATCH};
use std::sync::Arc;
use tracing::{info, instrument};
use warden_index::RegionDriver;
use warden_supervisor::CancelToken;

/// Copies every world from one driver to another unchanged
#[derive(Debug, Clone)]
pub struct DriverMigration {
    source: Arc<dyn RegionDriver>,
    destination: Arc<dyn RegionDriver>,
    flush_batch: usize,
    worlds: Option<Vec<String>>,
}

impl DriverMigration {
    pub fn new(source: Arc<dyn RegionDriver>, destination: Arc<dyn RegionDriver>) -> Self {
        Self {
            source,
            destination,
            flush_batch: DEFAULT_FLUSH_BATCH,
            worlds: None,
        }
    }

    /// Stage records to disk after every `batch` records instead of holding
    /// the whole world in memory.
    pub fn with_flush_batch(mut self, batch: usize) -> Self {
        self.flush_batch = batch.max(1);
        self
    }

    /// Limit the run to these worlds.
    pub fn only_worlds(mut self, worlds: Vec<String>) -> Self {
        self.worlds = Some(worlds);
        self
    }
}

impl Migration for DriverMigration {
    fn name(&self) -> &str {
        "driver"
    }

    #[instrument(skip(self, cancel), fields(from = self.source.name(), to = self.destination.name()))]
    fn run(&self, cancel: &CancelToken) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        for world in target_worlds(&self.source, &self.worlds)? {
            let source = self.source.store(&world)?;
            let destination = self.destination.store(&world)?;
            let pass = WorldPass {
                world: &world,
                source: source.as_ref(),
                destination: destination.as_ref(),
                cancel,
                flush_every: Some(self.flush_batch),
                in_place: false,
            };
            pass.run(&mut Step::Write, &mut report)?;
        }
        info!(
            migrated = report.migrated.len(),
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Driver migration finished"
        );
        conclude(report)
    }
}
