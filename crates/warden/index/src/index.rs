//! Per-world region index
//!
//! The index is the only writer of a world's regions. Every mutation copies
//! the current region list, applies the change, validates it and publishes a
//! fresh [`RegionSet`]. Readers clone the current `Arc` and never block on
//! writers for longer than that clone.

use crate::applicable::ApplicableRegionSet;
use crate::error::{IndexError, Result};
use crate::grid::DEFAULT_CELL_SHIFT;
use crate::snapshot::{RegionSet, MAX_PARENT_DEPTH};
use crate::storage::RegionStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use warden_types::{
    Actor, BlockPoint, Domain, FlagValue, Region, RegionGroup, RegionId, Shape,
};

/// How [`RegionIndex::add_region`] treats an existing id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Fail with `DuplicateId` if the id is taken
    Insert,
    /// Replace the existing region, keeping its position
    Replace,
}

/// What happens to children of a removed region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalStrategy {
    /// Children lose their parent pointer
    #[default]
    DetachChildren,
    /// Children and all their descendants are removed too
    CascadeRemoveChildren,
}

/// Region index for one world
pub struct RegionIndex {
    world: String,
    current: RwLock<Arc<RegionSet>>,
    writer: Mutex<()>,
    dirty: AtomicBool,
    revision: AtomicU64,
}

impl std::fmt::Debug for RegionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionIndex")
            .field("world", &self.world)
            .field("regions", &self.len())
            .finish()
    }
}

impl RegionIndex {
    pub fn new(world: impl Into<String>) -> Self {
        Self::with_cell_shift(world, DEFAULT_CELL_SHIFT)
    }

    /// Index whose spatial grid uses cells of `1 << shift` blocks.
    pub fn with_cell_shift(world: impl Into<String>, shift: u32) -> Self {
        let world = world.into();
        let shift = shift.clamp(1, 24);
        Self {
            current: RwLock::new(Arc::new(RegionSet::empty(world.clone(), shift))),
            world,
            writer: Mutex::new(()),
            dirty: AtomicBool::new(false),
            revision: AtomicU64::new(0),
        }
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    /// Current published snapshot.
    pub fn snapshot(&self) -> Arc<RegionSet> {
        Arc::clone(&self.current.read())
    }

    pub fn get(&self, id: &RegionId) -> Option<Arc<Region>> {
        self.snapshot().get(id).cloned()
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.snapshot().contains(id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All regions in insertion order.
    pub fn all(&self) -> Vec<Arc<Region>> {
        self.snapshot().arcs().to_vec()
    }

    /// Whether there are mutations not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Number of snapshots published so far. Every mutation publishes
    /// exactly one.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Regions containing `point`, ordered for flag resolution.
    pub fn applicable_regions(&self, point: BlockPoint) -> ApplicableRegionSet {
        self.snapshot().applicable_at(point)
    }

    /// Regions intersecting `shape`, ordered for flag resolution.
    pub fn applicable_regions_for(&self, shape: &Shape) -> ApplicableRegionSet {
        self.snapshot().applicable_in(shape)
    }

    /// Regions the actor owns, or belongs to when `include_members` is set.
    pub fn regions_owned_by(&self, actor: &Actor, include_members: bool) -> Vec<Arc<Region>> {
        let snapshot = self.snapshot();
        snapshot
            .arcs()
            .iter()
            .filter(|r| {
                if include_members {
                    r.is_member(actor)
                } else {
                    r.is_owner(actor)
                }
            })
            .cloned()
            .collect()
    }

    /// Number of regions the actor owns; used for claim limits.
    pub fn region_count_of(&self, actor: &Actor) -> usize {
        self.snapshot().owned_by(actor, false).count()
    }

    /// Apply a change to a private copy of the region list and publish it.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&Arc<RegionSet>, &mut Vec<Arc<Region>>) -> Result<T>,
    ) -> Result<T> {
        self.mutate_with(change)
    }

    fn mutate_with<T, E>(
        &self,
        change: impl FnOnce(&Arc<RegionSet>, &mut Vec<Arc<Region>>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        let mut regions = current.arcs().to_vec();
        let out = change(&current, &mut regions)?;
        self.publish(RegionSet::build(self.world.clone(), regions, current.cell_shift()));
        Ok(out)
    }

    /// Callers hold the writer lock.
    fn publish(&self, next: RegionSet) {
        *self.current.write() = Arc::new(next);
        self.dirty.store(true, Ordering::SeqCst);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Insert or replace a region.
    ///
    /// The region's parent must already exist and must not make the parent
    /// graph cyclic. Nothing is published on error.
    #[instrument(skip(self, region), fields(world = %self.world, region_id = %region.id()))]
    pub fn add_region(&self, region: Region, mode: AddMode) -> Result<()> {
        self.mutate(|current, regions| place(current, regions, region, mode))?;
        debug!(?mode, "Region published");
        Ok(())
    }

    /// Build a region from the current snapshot and publish it in the same
    /// swap.
    ///
    /// `build` runs under the writer lock, so whatever it checked against
    /// the snapshot still holds when the region is published.
    #[instrument(skip(self, build), fields(world = %self.world))]
    pub fn add_region_with<E>(
        &self,
        build: impl FnOnce(&Arc<RegionSet>) -> std::result::Result<(Region, AddMode), E>,
    ) -> std::result::Result<Arc<Region>, E>
    where
        E: From<IndexError>,
    {
        let published = self.mutate_with(|current, regions| -> std::result::Result<Arc<Region>, E> {
            let (region, mode) = build(current)?;
            Ok(place(current, regions, region, mode)?)
        })?;
        debug!(region_id = %published.id(), "Region published");
        Ok(published)
    }

    /// Remove a region, resolving its children per `strategy`.
    ///
    /// Returns removed ids, the requested region first.
    #[instrument(skip(self), fields(world = %self.world))]
    pub fn remove_region(&self, id: &RegionId, strategy: RemovalStrategy) -> Result<Vec<RegionId>> {
        let removed = self.mutate(|current, regions| {
            let root = current
                .get(id)
                .ok_or_else(|| IndexError::NotFound(id.clone()))?
                .id()
                .clone();
            let mut removed = vec![root.clone()];
            if strategy == RemovalStrategy::CascadeRemoveChildren {
                let mut queue = VecDeque::from([root.clone()]);
                while let Some(next) = queue.pop_front() {
                    for child in current.children_of(&next) {
                        if !removed.contains(&child) {
                            removed.push(child.clone());
                            queue.push_back(child);
                        }
                    }
                }
            }
            let gone: HashSet<RegionId> = removed.iter().cloned().collect();
            regions.retain(|r| !gone.contains(r.id()));
            for slot in regions.iter_mut() {
                if slot.parent().is_some_and(|p| gone.contains(p)) {
                    Arc::make_mut(slot).set_parent(None);
                }
            }
            Ok(removed)
        })?;
        info!(count = removed.len(), ?strategy, "Regions removed");
        Ok(removed)
    }

    /// Set or clear a region's parent.
    ///
    /// Walks upward from the proposed parent; reaching `child` fails with
    /// `CircularInheritance` and leaves every region untouched.
    #[instrument(skip(self), fields(world = %self.world))]
    pub fn set_parent(&self, child: &RegionId, parent: Option<&RegionId>) -> Result<()> {
        self.mutate(|current, regions| {
            let pos = current
                .position(child)
                .ok_or_else(|| IndexError::NotFound(child.clone()))?;
            let parent = match parent {
                Some(_) if current.at(pos).is_global() => return Err(IndexError::GlobalParent),
                Some(parent) => {
                    check_parent(current, child, parent)?;
                    current.get(parent).map(|r| r.id().clone())
                }
                None => None,
            };
            Arc::make_mut(&mut regions[pos]).set_parent(parent);
            Ok(())
        })
    }

    #[instrument(skip(self), fields(world = %self.world))]
    pub fn set_priority(&self, id: &RegionId, priority: i32) -> Result<()> {
        self.update(id, |region| region.set_priority(priority))
    }

    /// Set or clear a flag; returns the previous value.
    #[instrument(skip(self, value), fields(world = %self.world))]
    pub fn set_flag(
        &self,
        id: &RegionId,
        key: &str,
        value: Option<FlagValue>,
    ) -> Result<Option<FlagValue>> {
        self.update(id, |region| region.set_flag(key, value))
    }

    /// Set or clear several flags in one swap; returns the previous values
    /// in order.
    pub fn set_flags(
        &self,
        id: &RegionId,
        changes: Vec<(String, Option<FlagValue>)>,
    ) -> Result<Vec<Option<FlagValue>>> {
        self.update(id, |region| {
            changes
                .into_iter()
                .map(|(key, value)| region.set_flag(key, value))
                .collect()
        })
    }

    /// Set or clear the group selector stored under `group_key`.
    pub fn set_group_flag(
        &self,
        id: &RegionId,
        group_key: &str,
        group: Option<RegionGroup>,
    ) -> Result<Option<FlagValue>> {
        self.set_flag(id, group_key, group.map(FlagValue::from))
    }

    /// Edit a region's owner and member domains.
    pub fn update_domains<T>(
        &self,
        id: &RegionId,
        edit: impl FnOnce(&mut Domain, &mut Domain) -> T,
    ) -> Result<T> {
        self.update(id, |region| {
            let mut owners = std::mem::take(region.owners_mut());
            let out = edit(&mut owners, region.members_mut());
            *region.owners_mut() = owners;
            out
        })
    }

    /// Edits that cannot affect id or parent invariants.
    fn update<T>(&self, id: &RegionId, edit: impl FnOnce(&mut Region) -> T) -> Result<T> {
        self.mutate(|current, regions| {
            let pos = current
                .position(id)
                .ok_or_else(|| IndexError::NotFound(id.clone()))?;
            Ok(edit(Arc::make_mut(&mut regions[pos])))
        })
    }

    /// The global region, created empty if it does not exist yet.
    pub fn get_or_create_global(&self) -> Result<Arc<Region>> {
        let global = RegionId::global();
        if let Some(region) = self.get(&global) {
            return Ok(region);
        }
        self.mutate(|current, regions| {
            // Another writer may have created it since the check.
            if let Some(region) = current.get(&global) {
                return Ok(Arc::clone(region));
            }
            let region = Arc::new(Region::global());
            regions.push(Arc::clone(&region));
            Ok(region)
        })
    }

    /// Replace every region at once.
    ///
    /// Later duplicates replace earlier ones, parents that do not exist are
    /// cleared and cycles are broken at the first region found on one. Returns
    /// the number of regions published.
    #[instrument(skip(self, regions), fields(world = %self.world))]
    pub fn replace_all(&self, regions: Vec<Region>) -> usize {
        let regions = sanitize(&self.world, regions);
        let count = regions.len();
        let _guard = self.writer.lock();
        let shift = self.snapshot().cell_shift();
        self.publish(RegionSet::build(self.world.clone(), regions, shift));
        count
    }

    /// Replace the index contents with the store's records.
    #[instrument(skip(self, store), fields(world = %self.world))]
    pub fn load(&self, store: &dyn RegionStore) -> Result<usize> {
        let regions = store.load_all()?;
        let count = self.replace_all(regions);
        self.mark_clean();
        info!(count, "Regions loaded");
        Ok(count)
    }

    /// Write the current snapshot to the store.
    ///
    /// A failed save leaves the index dirty so it can simply be retried.
    #[instrument(skip(self, store), fields(world = %self.world))]
    pub fn save(&self, store: &dyn RegionStore) -> Result<usize> {
        let snapshot = self.snapshot();
        let count = store.save_all(&mut snapshot.iter())?;
        if Arc::ptr_eq(&snapshot, &self.snapshot()) {
            self.mark_clean();
        }
        info!(count, "Regions saved");
        Ok(count)
    }
}

/// Insert or replace `region` in the working copy of `current`.
fn place(
    current: &RegionSet,
    regions: &mut Vec<Arc<Region>>,
    region: Region,
    mode: AddMode,
) -> Result<Arc<Region>> {
    let existing = current.position(region.id());
    if existing.is_some() && mode == AddMode::Insert {
        return Err(IndexError::DuplicateId(region.id().clone()));
    }
    if let Some(parent) = region.parent() {
        if region.is_global() {
            return Err(IndexError::GlobalParent);
        }
        check_parent(current, region.id(), parent)?;
    }
    let region = Arc::new(region);
    match existing {
        Some(pos) => regions[pos] = Arc::clone(&region),
        None => regions.push(Arc::clone(&region)),
    }
    Ok(region)
}

/// Validate `parent` as the parent of `child` against `current`.
fn check_parent(current: &RegionSet, child: &RegionId, parent: &RegionId) -> Result<()> {
    let Some(mut cursor) = current.get(parent).map(Arc::clone) else {
        return Err(IndexError::NotFound(parent.clone()));
    };
    for _ in 0..MAX_PARENT_DEPTH {
        if cursor.id() == child {
            return Err(IndexError::CircularInheritance {
                child: child.clone(),
                parent: parent.clone(),
            });
        }
        match cursor.parent().and_then(|p| current.get(p)) {
            Some(next) => cursor = Arc::clone(next),
            None => return Ok(()),
        }
    }
    Err(IndexError::CircularInheritance {
        child: child.clone(),
        parent: parent.clone(),
    })
}

fn sanitize(world: &str, regions: Vec<Region>) -> Vec<Arc<Region>> {
    let mut order: Vec<Region> = Vec::with_capacity(regions.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for region in regions {
        match positions.get(region.id().key()) {
            Some(&pos) => {
                warn!(world, region_id = %region.id(), "Duplicate region id, keeping the later record");
                order[pos] = region;
            }
            None => {
                positions.insert(region.id().key().to_string(), order.len());
                order.push(region);
            }
        }
    }

    for region in order.iter_mut() {
        let missing = region
            .parent()
            .is_some_and(|p| !positions.contains_key(p.key()) || p == region.id());
        if missing {
            warn!(world, region_id = %region.id(), "Dropping unknown parent");
            region.set_parent(None);
        }
    }

    for start in 0..order.len() {
        let mut cursor = start;
        for _ in 0..=order.len() {
            let next = order[cursor]
                .parent()
                .and_then(|p| positions.get(p.key()).copied());
            match next {
                Some(pos) if pos == start => {
                    warn!(world, region_id = %order[start].id(), "Breaking circular inheritance");
                    order[start].set_parent(None);
                    break;
                }
                Some(pos) => cursor = pos,
                None => break,
            }
        }
    }

    order.into_iter().map(Arc::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryDriver, RegionDriver};
    use warden_types::{PlayerId, StateValue};

    fn id(s: &str) -> RegionId {
        RegionId::new(s).unwrap()
    }

    fn cuboid(name: &str, min: (i32, i32, i32), max: (i32, i32, i32)) -> Region {
        Region::new(
            id(name),
            Shape::cuboid(
                BlockPoint::new(min.0, min.1, min.2),
                BlockPoint::new(max.0, max.1, max.2),
            ),
        )
        .unwrap()
    }

    fn with_chain() -> RegionIndex {
        let index = RegionIndex::new("world");
        index.add_region(cuboid("a", (0, 0, 0), (9, 9, 9)), AddMode::Insert).unwrap();
        index
            .add_region(
                cuboid("b", (0, 0, 0), (9, 9, 9)).with_parent(Some(id("a"))),
                AddMode::Insert,
            )
            .unwrap();
        index
            .add_region(
                cuboid("c", (0, 0, 0), (9, 9, 9)).with_parent(Some(id("b"))),
                AddMode::Insert,
            )
            .unwrap();
        index
    }

    #[test]
    fn test_insert_rejects_duplicates_case_insensitively() {
        let index = RegionIndex::new("world");
        index.add_region(cuboid("Spawn", (0, 0, 0), (1, 1, 1)), AddMode::Insert).unwrap();
        let err = index
            .add_region(cuboid("spawn", (0, 0, 0), (1, 1, 1)), AddMode::Insert)
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(_)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_replace_keeps_position() {
        let index = with_chain();
        index
            .add_region(
                cuboid("a", (0, 0, 0), (2, 2, 2)).with_priority(4),
                AddMode::Replace,
            )
            .unwrap();
        let ids: Vec<_> = index.all().iter().map(|r| r.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(index.get(&id("a")).unwrap().priority(), 4);
    }

    #[test]
    fn test_add_with_unknown_parent_fails() {
        let index = RegionIndex::new("world");
        let err = index
            .add_region(
                cuboid("x", (0, 0, 0), (1, 1, 1)).with_parent(Some(id("ghost"))),
                AddMode::Insert,
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_set_parent_to_descendant_is_rejected() {
        let index = with_chain();
        let before = index.snapshot();
        let err = index.set_parent(&id("a"), Some(&id("c"))).unwrap_err();
        assert!(matches!(err, IndexError::CircularInheritance { .. }));
        assert!(Arc::ptr_eq(&before, &index.snapshot()));
        assert!(index.get(&id("a")).unwrap().parent().is_none());
        assert_eq!(index.get(&id("c")).unwrap().parent(), Some(&id("b")));
    }

    #[test]
    fn test_self_parent_is_circular() {
        let index = with_chain();
        assert!(matches!(
            index.set_parent(&id("b"), Some(&id("b"))),
            Err(IndexError::CircularInheritance { .. })
        ));
    }

    #[test]
    fn test_replace_cannot_smuggle_cycle() {
        let index = with_chain();
        let err = index
            .add_region(
                cuboid("a", (0, 0, 0), (9, 9, 9)).with_parent(Some(id("c"))),
                AddMode::Replace,
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::CircularInheritance { .. }));
    }

    #[test]
    fn test_remove_detaches_children() {
        let index = with_chain();
        let removed = index.remove_region(&id("B"), RemovalStrategy::DetachChildren).unwrap();
        assert_eq!(removed, vec![id("b")]);
        assert!(index.get(&id("c")).unwrap().parent().is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_cascades() {
        let index = with_chain();
        index.add_region(cuboid("other", (0, 0, 0), (1, 1, 1)), AddMode::Insert).unwrap();
        let removed = index
            .remove_region(&id("a"), RemovalStrategy::CascadeRemoveChildren)
            .unwrap();
        assert_eq!(removed, vec![id("a"), id("b"), id("c")]);
        assert_eq!(index.len(), 1);
        assert!(matches!(
            index.remove_region(&id("a"), RemovalStrategy::DetachChildren),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let index = with_chain();
        let snapshot = index.snapshot();
        index.set_flag(&id("a"), "build", Some(StateValue::Deny.into())).unwrap();
        assert!(snapshot.get(&id("a")).unwrap().flag("build").is_none());
        assert!(index.get(&id("a")).unwrap().flag("build").is_some());
    }

    #[test]
    fn test_point_query_for_disjoint_regions() {
        let index = RegionIndex::new("world");
        index.add_region(cuboid("left", (0, 0, 0), (10, 10, 10)).with_priority(1), AddMode::Insert).unwrap();
        index.add_region(cuboid("right", (20, 0, 0), (30, 10, 10)).with_priority(2), AddMode::Insert).unwrap();
        let hits = index.applicable_regions(BlockPoint::new(25, 5, 5));
        assert_eq!(hits.ids(), vec![id("right")]);
        assert!(index.applicable_regions(BlockPoint::new(15, 5, 5)).is_empty());
    }

    #[test]
    fn test_shape_query_finds_overlaps() {
        let index = RegionIndex::new("world");
        index.add_region(cuboid("a", (0, 0, 0), (10, 10, 10)), AddMode::Insert).unwrap();
        index.add_region(cuboid("b", (100, 0, 100), (110, 10, 110)), AddMode::Insert).unwrap();
        let probe = Shape::cuboid(BlockPoint::new(5, 5, 5), BlockPoint::new(50, 5, 50));
        assert_eq!(index.applicable_regions_for(&probe).ids(), vec![id("a")]);
    }

    #[test]
    fn test_domains_and_owner_counts() {
        let index = with_chain();
        let alice = Actor::new(PlayerId::generate(), "alice");
        for name in ["a", "b"] {
            index
                .update_domains(&id(name), |owners, _| owners.add_player(alice.id))
                .unwrap();
        }
        index
            .update_domains(&id("c"), |_, members| members.add_player(alice.id))
            .unwrap();
        assert_eq!(index.region_count_of(&alice), 2);
        assert_eq!(index.regions_owned_by(&alice, true).len(), 3);
    }

    #[test]
    fn test_global_created_on_demand() {
        let index = RegionIndex::new("world");
        assert!(index.get_or_create_global().unwrap().is_global());
        assert!(index.get_or_create_global().unwrap().is_global());
        assert_eq!(index.len(), 1);
        assert_eq!(index.revision(), 1);
    }

    #[test]
    fn test_global_region_cannot_take_a_parent() {
        let index = with_chain();
        index.get_or_create_global().unwrap();
        let global = RegionId::global();
        assert!(matches!(
            index.set_parent(&global, Some(&id("a"))),
            Err(IndexError::GlobalParent)
        ));
        assert!(matches!(
            index.add_region(Region::global().with_parent(Some(id("a"))), AddMode::Replace),
            Err(IndexError::GlobalParent)
        ));
        assert!(index.get(&global).unwrap().parent().is_none());
        index.set_parent(&global, None).unwrap();
    }

    #[test]
    fn test_flag_batch_publishes_once() {
        let index = with_chain();
        index.set_flag(&id("b"), "build", Some(StateValue::Allow.into())).unwrap();
        let before = index.revision();
        let snapshot = index.snapshot();
        let previous = index
            .set_flags(
                &id("b"),
                vec![
                    ("build".to_string(), Some(StateValue::Deny.into())),
                    ("build-group".to_string(), Some(RegionGroup::NonMembers.into())),
                ],
            )
            .unwrap();
        assert_eq!(previous, vec![Some(FlagValue::State(StateValue::Allow)), None]);
        assert_eq!(index.revision(), before + 1);
        assert!(snapshot.get(&id("b")).unwrap().flag("build-group").is_none());
        let b = index.get(&id("b")).unwrap();
        assert_eq!(b.group_flag("build-group"), Some(RegionGroup::NonMembers));
    }

    #[test]
    fn test_checked_insert_sees_latest_snapshot() {
        let index = RegionIndex::new("world");
        let alice = Actor::new(PlayerId::generate(), "alice");
        let limit = |current: &Arc<RegionSet>, name: &str| -> Result<(Region, AddMode)> {
            if current.owned_by(&alice, false).count() >= 1 {
                return Err(IndexError::DuplicateId(id(name)));
            }
            let mut region = cuboid(name, (0, 0, 0), (1, 1, 1));
            region.owners_mut().add_player(alice.id);
            Ok((region, AddMode::Insert))
        };
        std::thread::scope(|scope| {
            for name in ["p1", "p2", "p3", "p4"] {
                let index = &index;
                let limit = &limit;
                scope.spawn(move || index.add_region_with(|current| limit(current, name)));
            }
        });
        assert_eq!(index.region_count_of(&alice), 1);
    }

    #[test]
    fn test_replace_all_repairs_parents() {
        let index = RegionIndex::new("world");
        let count = index.replace_all(vec![
            cuboid("a", (0, 0, 0), (1, 1, 1)).with_parent(Some(id("b"))),
            cuboid("b", (0, 0, 0), (1, 1, 1)).with_parent(Some(id("a"))),
            cuboid("c", (0, 0, 0), (1, 1, 1)).with_parent(Some(id("missing"))),
            cuboid("A", (0, 0, 0), (2, 2, 2)).with_parent(Some(id("b"))),
        ]);
        assert_eq!(count, 3);
        let a = index.get(&id("a")).unwrap();
        assert_eq!(a.id().as_str(), "A");
        assert!(index.get(&id("c")).unwrap().parent().is_none());
        let b = index.get(&id("b")).unwrap();
        assert!(a.parent().is_none() || b.parent().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let driver = MemoryDriver::new();
        let store = driver.store("world").unwrap();
        let index = with_chain();
        index.set_priority(&id("b"), -2).unwrap();
        assert!(index.is_dirty());
        assert_eq!(index.save(store.as_ref()).unwrap(), 3);
        assert!(!index.is_dirty());

        let reloaded = RegionIndex::new("world");
        reloaded.load(store.as_ref()).unwrap();
        let left: Vec<_> = index.all().iter().map(|r| (**r).clone()).collect();
        let right: Vec<_> = reloaded.all().iter().map(|r| (**r).clone()).collect();
        assert_eq!(left, right);
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn test_failed_save_stays_dirty() {
        let driver = MemoryDriver::new();
        let store = driver.memory_store("world");
        let index = with_chain();
        store.set_fail_writes(true);
        assert!(matches!(index.save(store.as_ref()), Err(IndexError::Storage(_))));
        assert!(index.is_dirty());
        store.set_fail_writes(false);
        assert_eq!(index.save(store.as_ref()).unwrap(), 3);
    }
}
