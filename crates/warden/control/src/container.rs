//! Per-world region indices and the tasks that persist and migrate them
//!
//! A [`RegionContainer`] is created once per process. Region queries and
//! small edits run directly against the world's [`RegionIndex`]; anything
//! touching storage is submitted to the [`Supervisor`] and returns a
//! [`TaskHandle`].
//!
//! Edits are refused with `PendingTasks` while an exclusive task holds
//! their world or the whole process, since a load, reload or migration
//! would replace the index underneath them.

use crate::config::{StorageConfig, WardenConfig};
use crate::error::{ControlError, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use warden_index::{RegionDriver, RegionIndex, RegionStore};
use warden_migration::{
    DriverMigration, HeightMigration, HeightRange, HeightStrategy, IdentityMigration, Migration,
    MigrationError, MigrationReport, ProfileResolver, UnresolvedPolicy,
};
use warden_supervisor::{
    CancelToken, ExclusiveSlot, SubmitOptions, Supervisor, TaskError, TaskHandle, TaskId, TaskInfo,
};
use warden_types::FlagRegistry;

/// Owns every world's index, the storage driver and the task supervisor
#[derive(Clone)]
pub struct RegionContainer {
    pub(crate) shared: Arc<Shared>,
    pub(crate) supervisor: Supervisor,
}

pub(crate) struct Shared {
    config: RwLock<Arc<WardenConfig>>,
    driver: RwLock<Arc<dyn RegionDriver>>,
    indices: DashMap<String, Arc<RegionIndex>>,
    pub(crate) registry: FlagRegistry,
    save_failures: DashMap<String, String>,
    last_migration: Mutex<Option<MigrationReport>>,
    pub(crate) profiler: ExclusiveSlot<TaskId>,
    /// Edits hold it shared from their conflict check until they publish;
    /// exclusive submissions hold it while registering their task.
    gate: RwLock<()>,
}

impl RegionContainer {
    /// Build from configuration. Must be called inside a tokio runtime.
    pub fn new(config: WardenConfig) -> Result<Self> {
        let driver = config.storage.open();
        let supervisor = Supervisor::new(config.supervisor.clone())?;
        Ok(Self::with_parts(config, driver, supervisor))
    }

    pub fn with_parts(
        config: WardenConfig,
        driver: Arc<dyn RegionDriver>,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: RwLock::new(Arc::new(config)),
                driver: RwLock::new(driver),
                indices: DashMap::new(),
                registry: FlagRegistry::with_defaults(),
                save_failures: DashMap::new(),
                last_migration: Mutex::new(None),
                profiler: ExclusiveSlot::new("Profiling"),
                gate: RwLock::new(()),
            }),
            supervisor,
        }
    }

    pub fn config(&self) -> Arc<WardenConfig> {
        self.shared.config()
    }

    pub fn registry(&self) -> &FlagRegistry {
        &self.shared.registry
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn driver(&self) -> Arc<dyn RegionDriver> {
        self.shared.driver()
    }

    /// Index of a world, created empty on first use.
    pub fn index(&self, world: &str) -> Result<Arc<RegionIndex>> {
        self.shared.index(world)
    }

    /// Worlds with an index in memory, sorted.
    pub fn worlds(&self) -> Vec<String> {
        let mut worlds: Vec<String> = self
            .shared
            .indices
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        worlds.sort();
        worlds
    }

    /// Apply an edit to a world's index unless a pending task conflicts
    /// with it.
    pub(crate) fn edit<T>(
        &self,
        world: &str,
        edit: impl FnOnce(&RegionIndex) -> Result<T>,
    ) -> Result<T> {
        let _gate = self.shared.gate.read();
        self.supervisor
            .check_conflicts(&SubmitOptions::on(world_resource(world)))?;
        let index = self.index(world)?;
        edit(&index)
    }

    /// Load one world, or every world the driver knows.
    pub fn load(&self, owner: &str, world: Option<&str>) -> Result<TaskHandle<usize>> {
        let (worlds, options) = self.scope(world)?;
        let _gate = self.shared.gate.write();
        let shared = Arc::clone(&self.shared);
        let handle = self.supervisor.submit_blocking(
            describe("Load regions", world),
            owner,
            options,
            move |cancel| {
                let mut total = 0;
                for world in &worlds {
                    cancel.check()?;
                    total += shared.load_world(world).map_err(TaskError::failed)?;
                }
                Ok(total)
            },
        )?;
        Ok(handle)
    }

    /// Save one world, or every loaded world.
    ///
    /// A world that fails to save is recorded in [`save_failures`] and the
    /// remaining worlds are still attempted.
    ///
    /// [`save_failures`]: RegionContainer::save_failures
    pub fn save(&self, owner: &str, world: Option<&str>) -> Result<TaskHandle<usize>> {
        // Saving never creates an index; an unloaded world has nothing to write.
        let (worlds, options) = match world {
            Some(world) => {
                self.shared.ensure_enabled(world)?;
                (
                    vec![world.to_string()],
                    SubmitOptions::on(world_resource(world)).exclusive(),
                )
            }
            None => (self.worlds(), SubmitOptions::default().exclusive()),
        };
        let _gate = self.shared.gate.write();
        let shared = Arc::clone(&self.shared);
        let handle = self.supervisor.submit_blocking(
            describe("Save regions", world),
            owner,
            options,
            move |cancel| {
                let mut total = 0;
                let mut failed = Vec::new();
                for world in &worlds {
                    cancel.check()?;
                    match shared.save_world(world) {
                        Ok(count) => total += count,
                        Err(_) => failed.push(world.clone()),
                    }
                }
                if failed.is_empty() {
                    Ok(total)
                } else {
                    Err(TaskError::Failed(format!(
                        "could not save {}",
                        failed.join(", ")
                    )))
                }
            },
        )?;
        Ok(handle)
    }

    /// Worlds whose last save failed, with the reason.
    pub fn save_failures(&self) -> BTreeMap<String, String> {
        self.shared
            .save_failures
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Save pending changes, switch to `config` and load every world again.
    ///
    /// Refused while any task is pending. If saving fails the old
    /// configuration stays in place.
    #[instrument(skip(self, config))]
    pub fn reload(&self, owner: &str, config: WardenConfig) -> Result<TaskHandle<usize>> {
        let _gate = self.shared.gate.write();
        self.supervisor.ensure_idle()?;
        let shared = Arc::clone(&self.shared);
        let handle = self.supervisor.submit_blocking(
            "Reload region configuration",
            owner,
            SubmitOptions::default().exclusive(),
            move |cancel| {
                shared.save_dirty().map_err(TaskError::failed)?;
                shared.apply_config(config);
                let mut total = 0;
                for world in shared.known_worlds().map_err(TaskError::failed)? {
                    cancel.check()?;
                    total += shared.load_world(&world).map_err(TaskError::failed)?;
                }
                info!(regions = total, "Configuration reloaded");
                Ok(total)
            },
        )?;
        Ok(handle)
    }

    /// Copy every world from the current driver to `destination`.
    pub fn migrate_driver(
        &self,
        owner: &str,
        destination: StorageConfig,
    ) -> Result<TaskHandle<MigrationReport>> {
        let flush_batch = destination.flush_batch;
        let target = destination.open();
        self.run_migration(owner, "Migrate region storage", false, move |source| {
            Box::new(DriverMigration::new(source, target).with_flush_batch(flush_batch))
        })
    }

    /// Rekey name-based owners and members to player ids. `policy` defaults
    /// to the configured handling of unresolved names.
    pub fn migrate_identity(
        &self,
        owner: &str,
        resolver: Arc<dyn ProfileResolver>,
        policy: Option<UnresolvedPolicy>,
    ) -> Result<TaskHandle<MigrationReport>> {
        let policy = policy.unwrap_or_else(|| self.config().regions.unresolved_policy());
        self.run_migration(owner, "Migrate player identities", true, move |driver| {
            Box::new(IdentityMigration::new(driver, resolver, policy))
        })
    }

    /// Move region heights to a new world height range.
    pub fn migrate_heights(
        &self,
        owner: &str,
        worlds: Option<Vec<String>>,
        from: HeightRange,
        to: HeightRange,
        strategy: HeightStrategy,
    ) -> Result<TaskHandle<MigrationReport>> {
        self.run_migration(owner, "Migrate region heights", true, move |driver| {
            let migration = HeightMigration::new(driver, from, to, strategy);
            Box::new(match worlds {
                Some(worlds) => migration.only_worlds(worlds),
                None => migration,
            })
        })
    }

    /// Report of the most recent migration, including failed ones.
    pub fn last_migration(&self) -> Option<MigrationReport> {
        self.shared.last_migration.lock().clone()
    }

    /// Migrations are process-wide: pending changes are saved first, and
    /// in-place migrations reload the worlds they touched afterwards.
    fn run_migration<F>(
        &self,
        owner: &str,
        description: &str,
        reload_after: bool,
        make: F,
    ) -> Result<TaskHandle<MigrationReport>>
    where
        F: FnOnce(Arc<dyn RegionDriver>) -> Box<dyn Migration> + Send + 'static,
    {
        let _gate = self.shared.gate.write();
        self.supervisor.ensure_idle()?;
        let shared = Arc::clone(&self.shared);
        let handle = self.supervisor.submit_blocking(
            description,
            owner,
            SubmitOptions::default().exclusive(),
            move |cancel| shared.migrate(make, reload_after, cancel),
        )?;
        Ok(handle)
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.supervisor.list()
    }

    pub fn cancel(&self, id: TaskId) -> Result<bool> {
        Ok(self.supervisor.cancel(id)?)
    }

    /// Cancel all pending work and refuse new tasks.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    /// Worlds and conflict rules for a load or save.
    fn scope(&self, world: Option<&str>) -> Result<(Vec<String>, SubmitOptions)> {
        match world {
            Some(world) => {
                self.shared.index(world)?;
                Ok((
                    vec![world.to_string()],
                    SubmitOptions::on(world_resource(world)).exclusive(),
                ))
            }
            None => Ok((
                self.shared.known_worlds()?,
                SubmitOptions::default().exclusive(),
            )),
        }
    }
}

impl std::fmt::Debug for RegionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionContainer")
            .field("worlds", &self.worlds())
            .field("driver", &self.driver().name())
            .finish()
    }
}

pub(crate) fn world_resource(world: &str) -> String {
    format!("world:{world}")
}

fn describe(action: &str, world: Option<&str>) -> String {
    match world {
        Some(world) => format!("{action} in {world}"),
        None => format!("{action} in all worlds"),
    }
}

impl Shared {
    fn config(&self) -> Arc<WardenConfig> {
        self.config.read().clone()
    }

    fn driver(&self) -> Arc<dyn RegionDriver> {
        self.driver.read().clone()
    }

    fn ensure_enabled(&self, world: &str) -> Result<()> {
        if self.config().world(world).use_regions {
            Ok(())
        } else {
            Err(ControlError::RegionsDisabled(world.to_string()))
        }
    }

    pub(crate) fn index(&self, world: &str) -> Result<Arc<RegionIndex>> {
        if let Some(index) = self.indices.get(world) {
            return Ok(Arc::clone(&index));
        }
        self.ensure_enabled(world)?;
        let shift = self.config().world(world).grid_cell_shift;
        let index = self
            .indices
            .entry(world.to_string())
            .or_insert_with(|| Arc::new(RegionIndex::with_cell_shift(world, shift)))
            .clone();
        Ok(index)
    }

    /// Worlds the driver has data for plus worlds loaded in memory, minus
    /// worlds with regions disabled.
    fn known_worlds(&self) -> Result<Vec<String>> {
        let config = self.config();
        let mut worlds = self.driver().worlds()?;
        worlds.extend(self.indices.iter().map(|entry| entry.key().clone()));
        worlds.sort();
        worlds.dedup();
        worlds.retain(|world| config.world(world).use_regions);
        Ok(worlds)
    }

    fn store(&self, world: &str) -> Result<Arc<dyn RegionStore>> {
        Ok(self.driver().store(world)?)
    }

    fn load_world(&self, world: &str) -> Result<usize> {
        let index = self.index(world)?;
        let store = self.store(world)?;
        Ok(index.load(store.as_ref())?)
    }

    fn save_world(&self, world: &str) -> Result<usize> {
        let Some(index) = self.indices.get(world).map(|entry| Arc::clone(&entry)) else {
            return Ok(0);
        };
        let result = self
            .store(world)
            .and_then(|store| Ok(index.save(store.as_ref())?));
        match &result {
            Ok(_) => {
                self.save_failures.remove(world);
            }
            Err(e) => {
                warn!(world = %world, error = %e, "Failed to save regions");
                self.save_failures.insert(world.to_string(), e.to_string());
            }
        }
        result
    }

    /// Save every index with unsaved changes; stops at the first failure.
    fn save_dirty(&self) -> Result<()> {
        let dirty: Vec<String> = self
            .indices
            .iter()
            .filter(|entry| entry.value().is_dirty())
            .map(|entry| entry.key().clone())
            .collect();
        for world in dirty {
            self.save_world(&world)?;
        }
        Ok(())
    }

    fn apply_config(&self, config: WardenConfig) {
        let previous = self.config();
        if previous.supervisor != config.supervisor {
            warn!("Supervisor settings take effect after a restart");
        }
        if previous.storage != config.storage {
            *self.driver.write() = config.storage.open();
            info!(driver = ?config.storage.driver, "Storage driver switched");
        }
        self.indices.clear();
        self.save_failures.clear();
        *self.config.write() = Arc::new(config);
    }

    fn migrate<F>(
        &self,
        make: F,
        reload_after: bool,
        cancel: &CancelToken,
    ) -> std::result::Result<MigrationReport, TaskError>
    where
        F: FnOnce(Arc<dyn RegionDriver>) -> Box<dyn Migration>,
    {
        self.save_dirty().map_err(TaskError::failed)?;
        let migration = make(self.driver());
        info!(migration = migration.name(), "Migration started");
        let outcome = migration.run(cancel);

        let report = match &outcome {
            Ok(report) => Some(report.clone()),
            Err(e) => e.report().cloned(),
        };
        if let Some(report) = &report {
            if reload_after {
                for world in &report.worlds {
                    if self.indices.contains_key(world) {
                        self.load_world(world).map_err(TaskError::failed)?;
                    }
                }
            }
            info!(
                migration = migration.name(),
                migrated = report.migrated.len(),
                failed = report.failures.len(),
                unresolved = report.unresolved.len(),
                "Migration finished"
            );
        }
        *self.last_migration.lock() = report;

        match outcome {
            Ok(report) => Ok(report),
            Err(MigrationError::Cancelled { .. }) => Err(TaskError::Cancelled),
            Err(e) => Err(TaskError::failed(e)),
        }
    }
}
