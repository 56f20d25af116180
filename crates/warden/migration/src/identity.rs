//! Name to player id migration
//!
//! Older data keys owners and members by player name. This migration
//! resolves every name once, in batches, then rewrites each world in place.

use crate::engine::{Step, WorldPass};
use crate::error::{MigrationError, MigrationReport, Result};
use crate::{conclude, target_worlds, Migration};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use warden_index::RegionDriver;
use warden_supervisor::CancelToken;
use warden_types::{Domain, PlayerId, Region};

/// Names sent to the resolver per call
pub const RESOLVE_BATCH: usize = 100;

/// What to do with names the resolver does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Remove them from owners and members
    Drop,
    /// Keep them as name entries
    #[default]
    KeepNames,
    /// Abort before writing anything
    Reject,
}

/// Looks up player ids by name
pub trait ProfileResolver: Send + Sync {
    /// Resolve a batch of lowercase names. Unknown names are simply absent
    /// from the returned map.
    fn resolve(&self, names: &[String]) -> std::result::Result<HashMap<String, PlayerId>, String>;
}

/// Resolver backed by a fixed table
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    known: HashMap<String, PlayerId>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, id: PlayerId) -> Self {
        self.known.insert(name.to_lowercase(), id);
        self
    }
}

impl ProfileResolver for StaticResolver {
    fn resolve(&self, names: &[String]) -> std::result::Result<HashMap<String, PlayerId>, String> {
        Ok(names
            .iter()
            .filter_map(|name| self.known.get(name).map(|id| (name.clone(), *id)))
            .collect())
    }
}

/// Rekeys name-based domain entries to player ids
pub struct IdentityMigration {
    driver: Arc<dyn RegionDriver>,
    resolver: Arc<dyn ProfileResolver>,
    policy: UnresolvedPolicy,
    worlds: Option<Vec<String>>,
}

impl IdentityMigration {
    pub fn new(
        driver: Arc<dyn RegionDriver>,
        resolver: Arc<dyn ProfileResolver>,
        policy: UnresolvedPolicy,
    ) -> Self {
        Self {
            driver,
            resolver,
            policy,
            worlds: None,
        }
    }

    pub fn only_worlds(mut self, worlds: Vec<String>) -> Self {
        self.worlds = Some(worlds);
        self
    }

    fn collect_names(&self, worlds: &[String], cancel: &CancelToken) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for world in worlds {
            let store = self.driver.store(world)?;
            store.stream(&mut |record| {
                if cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                // Undecodable records are reported by the rewrite pass.
                let Ok(region) = record else {
                    return ControlFlow::Continue(());
                };
                names.extend(region.owners().names().iter().cloned());
                names.extend(region.members().names().iter().cloned());
                ControlFlow::Continue(())
            })?;
        }
        Ok(names)
    }

    fn resolve_all(
        &self,
        names: &BTreeSet<String>,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, PlayerId>> {
        let names: Vec<String> = names.iter().cloned().collect();
        let mut resolved = HashMap::new();
        for batch in names.chunks(RESOLVE_BATCH) {
            if cancel.is_cancelled() {
                break;
            }
            let found = self.resolver.resolve(batch).map_err(MigrationError::Resolver)?;
            resolved.extend(found.into_iter().map(|(k, v)| (k.to_lowercase(), v)));
        }
        Ok(resolved)
    }
}

impl Migration for IdentityMigration {
    fn name(&self) -> &str {
        "identity"
    }

    #[instrument(skip(self, cancel), fields(policy = ?self.policy))]
    fn run(&self, cancel: &CancelToken) -> Result<MigrationReport> {
        let worlds = target_worlds(&self.driver, &self.worlds)?;
        let names = self.collect_names(&worlds, cancel)?;
        let resolved = self.resolve_all(&names, cancel)?;
        if cancel.is_cancelled() {
            return conclude(MigrationReport {
                cancelled: true,
                ..MigrationReport::default()
            });
        }

        let unresolved: BTreeSet<String> = names
            .iter()
            .filter(|name| !resolved.contains_key(*name))
            .cloned()
            .collect();
        info!(
            names = names.len(),
            resolved = resolved.len(),
            unresolved = unresolved.len(),
            "Player names resolved"
        );
        if !unresolved.is_empty() {
            if self.policy == UnresolvedPolicy::Reject {
                return Err(MigrationError::UnresolvedIdentity(
                    unresolved.into_iter().collect(),
                ));
            }
            warn!(count = unresolved.len(), policy = ?self.policy, "Unresolved player names");
        }

        let mut report = MigrationReport {
            unresolved,
            ..MigrationReport::default()
        };
        let keep_names = self.policy == UnresolvedPolicy::KeepNames;
        for world in &worlds {
            let store = self.driver.store(world)?;
            let pass = WorldPass {
                world,
                source: store.as_ref(),
                destination: store.as_ref(),
                cancel,
                flush_every: None,
                in_place: true,
            };
            pass.run(
                &mut |region| Step::Write(rekey(region, &resolved, keep_names)),
                &mut report,
            )?;
        }
        conclude(report)
    }
}

fn rekey(mut region: Region, resolved: &HashMap<String, PlayerId>, keep_names: bool) -> Region {
    rekey_domain(region.owners_mut(), resolved, keep_names);
    rekey_domain(region.members_mut(), resolved, keep_names);
    region
}

fn rekey_domain(domain: &mut Domain, resolved: &HashMap<String, PlayerId>, keep_names: bool) {
    for name in domain.take_names() {
        match resolved.get(&name) {
            Some(id) => {
                domain.add_player(*id);
            }
            None if keep_names => {
                domain.add_name(&name);
            }
            None => {}
        }
    }
}
