//! Region commands: define, claim, select, inspect and edit regions
//!
//! These run directly on the caller's thread against the world's index.
//! Every edit is one atomic snapshot swap, so concurrent flag queries see
//! either the old or the new region, never a mix. Edits are refused while a
//! load, reload or migration is pending. Only listing, which may walk a
//! large world, is submitted as a task.

use crate::container::{world_resource, RegionContainer};
use crate::error::{ControlError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use warden_flags::FlagValueCalculator;
use warden_index::{
    AddMode, ApplicableRegionSet, IndexError, RegionIndex, RegionSet, RemovalStrategy,
};
use warden_supervisor::{SubmitOptions, TaskHandle};
use warden_types::{
    Actor, BlockPoint, Domain, FlagValue, Location, PlayerId, Region, RegionError, RegionGroup,
    RegionId, Shape,
};

/// Regions per page of [`RegionContainer::list`]
pub const LIST_PAGE_SIZE: usize = 10;

/// Region details for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionInfo {
    pub world: String,
    pub region: Region,
    /// Ancestors, nearest first
    pub parents: Vec<RegionId>,
    pub children: Vec<RegionId>,
    pub volume: u64,
}

/// Which regions [`RegionContainer::list`] shows
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only regions this actor owns
    pub owner: Option<Actor>,
    /// With `owner`, also regions the actor is a member of
    pub include_members: bool,
    /// Only regions intersecting this shape
    pub intersecting: Option<Shape>,
    /// Only ids containing this text, ignoring case
    pub id_contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    /// Position in the full listing, from 1
    pub number: usize,
    pub id: RegionId,
    pub owner: bool,
    pub member: bool,
}

/// One page of a region listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    /// Zero-based page number
    pub page: usize,
    pub pages: usize,
    pub total: usize,
}

/// Result of [`RegionContainer::set_flag`]
#[derive(Debug, Clone, PartialEq)]
pub struct FlagChange {
    /// Registered name the input resolved to
    pub flag: String,
    pub previous: Option<FlagValue>,
    /// Group selector now stored, if one was given and differs from the
    /// flag's default
    pub group: Option<RegionGroup>,
}

/// Destination of [`RegionContainer::teleport_target`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportKind {
    /// The region's `teleport` flag
    Teleport,
    /// The region's `spawn` flag
    Spawn,
    /// Middle of the region's bounding box
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainRole {
    Owners,
    Members,
}

/// One entry of an owner or member list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEntry {
    Player(PlayerId),
    Name(String),
    Group(String),
}

impl DomainEntry {
    fn add_to(&self, domain: &mut Domain) -> bool {
        match self {
            DomainEntry::Player(id) => domain.add_player(*id),
            DomainEntry::Name(name) => domain.add_name(name),
            DomainEntry::Group(group) => domain.add_group(group),
        }
    }

    fn remove_from(&self, domain: &mut Domain) -> bool {
        match self {
            DomainEntry::Player(id) => domain.remove_player(id),
            DomainEntry::Name(name) => domain.remove_name(name),
            DomainEntry::Group(group) => domain.remove_group(group),
        }
    }
}

impl RegionContainer {
    /// Regions at a point, ordered for flag resolution.
    pub fn query(&self, world: &str, point: BlockPoint) -> Result<ApplicableRegionSet> {
        Ok(self.index(world)?.applicable_regions(point))
    }

    /// Effective value of a flag at a point.
    pub fn query_flag(
        &self,
        world: &str,
        point: BlockPoint,
        actor: Option<&Actor>,
        flag: &str,
    ) -> Result<Option<FlagValue>> {
        let set = self.query(world, point)?;
        Ok(FlagValueCalculator::new(&set, self.registry()).query_value(actor, flag))
    }

    /// Create a region, optionally owned by `owner`.
    #[instrument(skip(self, shape, owner), fields(world = %world))]
    pub fn define(
        &self,
        world: &str,
        id: &str,
        shape: Shape,
        owner: Option<&Actor>,
    ) -> Result<Arc<Region>> {
        let mut region = Region::new(RegionId::new(id)?, shape)?;
        if let Some(owner) = owner {
            region.owners_mut().add_player(owner.id);
        }
        let region = self.edit(world, |index| {
            index.add_region_with(|_| -> Result<(Region, AddMode)> {
                Ok((region, AddMode::Insert))
            })
        })?;
        info!(region_id = %region.id(), "Region defined");
        Ok(region)
    }

    /// Give an existing region a new shape, keeping everything else.
    #[instrument(skip(self, shape), fields(world = %world))]
    pub fn redefine(&self, world: &str, id: &str, shape: Shape) -> Result<Arc<Region>> {
        let id = RegionId::new(id)?;
        let region = self.edit(world, |index| {
            index.add_region_with(|current| -> Result<(Region, AddMode)> {
                let existing = current
                    .get(&id)
                    .ok_or_else(|| IndexError::NotFound(id.clone()))?;
                let mut region = Region::new(id.clone(), shape)?;
                region.copy_from(existing);
                Ok((region, AddMode::Replace))
            })
        })?;
        info!(region_id = %region.id(), "Region redefined");
        Ok(region)
    }

    /// Claim a region for `actor`, subject to the world's claim limits.
    ///
    /// Claiming an id the actor already owns reshapes that region. Every
    /// limit is checked against the snapshot the claim is published over,
    /// so concurrent claims cannot exceed them together.
    #[instrument(skip(self, actor, shape), fields(world = %world, player = %actor.name))]
    pub fn claim(&self, world: &str, actor: &Actor, id: &str, shape: Shape) -> Result<Arc<Region>> {
        let settings = self.config().world(world);
        let id = RegionId::new(id)?;
        if matches!(shape, Shape::Polygon(_)) {
            return Err(ControlError::PolygonClaim);
        }
        let volume = shape.volume();
        if volume > settings.max_claim_volume {
            return Err(ControlError::ClaimTooLarge {
                volume,
                max: settings.max_claim_volume,
            });
        }
        let template = settings
            .set_parent_on_claim
            .as_deref()
            .map(RegionId::new)
            .transpose()?;

        let region = self.edit(world, |index| {
            index.add_region_with(|current| -> Result<(Region, AddMode)> {
                let existing = current.get(&id);
                match existing {
                    Some(region) if !region.is_owner(actor) => {
                        return Err(IndexError::DuplicateId(id.clone()).into());
                    }
                    Some(_) => {}
                    None => {
                        if let Some(max) = settings.max_region_count() {
                            if current.owned_by(actor, false).count() as u64 >= max {
                                return Err(ControlError::ClaimLimit { max });
                            }
                        }
                    }
                }

                let overlapping = current.applicable_in(&shape).without_global();
                let mut others = overlapping.iter().filter(|r| r.id() != &id).peekable();
                if settings.claim_only_inside_existing_regions && others.peek().is_none() {
                    return Err(ControlError::ClaimOutsideRegions);
                }
                if others.any(|r| !r.is_owner(actor)) {
                    return Err(ControlError::ClaimOverlap);
                }

                let mut region = Region::new(id.clone(), shape)?;
                let mode = match existing {
                    Some(previous) => {
                        region.copy_from(previous);
                        AddMode::Replace
                    }
                    None => {
                        region.owners_mut().add_player(actor.id);
                        match &template {
                            Some(parent) if current.contains(parent) => {
                                region.set_parent(Some(parent.clone()));
                            }
                            Some(parent) => {
                                warn!(parent = %parent, "Claim parent region does not exist");
                            }
                            None => {}
                        }
                        AddMode::Insert
                    }
                };
                Ok((region, mode))
            })
        })?;
        info!(region_id = %region.id(), volume, "Region claimed");
        Ok(region)
    }

    /// Remove a region; returns every removed id.
    #[instrument(skip(self), fields(world = %world))]
    pub fn remove(
        &self,
        world: &str,
        id: &str,
        strategy: RemovalStrategy,
    ) -> Result<Vec<RegionId>> {
        let id = RegionId::new(id)?;
        let removed = self.edit(world, |index| Ok(index.remove_region(&id, strategy)?))?;
        info!(count = removed.len(), "Regions removed");
        Ok(removed)
    }

    /// The single region containing `point`.
    ///
    /// With nothing there, falls back to the global region when
    /// `allow_global` is set. Several regions at the point are ambiguous.
    pub fn select_at(
        &self,
        world: &str,
        point: BlockPoint,
        allow_global: bool,
    ) -> Result<Arc<Region>> {
        let set = self.index(world)?.applicable_regions(point).without_global();
        match set.len() {
            // Selecting is a read; an absent global region stays absent.
            0 if allow_global => Ok(set
                .snapshot()
                .get(&RegionId::global())
                .cloned()
                .unwrap_or_else(|| Arc::new(Region::global()))),
            0 => Err(ControlError::NotInRegion),
            1 => {
                let id = set.ids().remove(0);
                Ok(set
                    .snapshot()
                    .get(&id)
                    .cloned()
                    .ok_or(IndexError::NotFound(id))?)
            }
            _ => Err(ControlError::AmbiguousRegion(
                set.iter().map(|r| r.id().to_string()).collect(),
            )),
        }
    }

    pub fn info(&self, world: &str, id: &str) -> Result<RegionInfo> {
        let snapshot = self.index(world)?.snapshot();
        let id = RegionId::new(id)?;
        let region = match snapshot.get(&id) {
            Some(region) => Region::clone(region),
            None if id.is_global() => Region::global(),
            None => return Err(IndexError::NotFound(id).into()),
        };
        Ok(RegionInfo {
            world: world.to_string(),
            parents: snapshot.ancestors(&region).map(|r| r.id().clone()).collect(),
            children: snapshot.children_of(region.id()),
            volume: region.volume(),
            region,
        })
    }

    /// Where `actor` would be sent by the region's teleport, spawn or
    /// center.
    ///
    /// Location flags are inherited from parents and honour their group
    /// selector, so a members-only teleport is refused to outsiders.
    pub fn teleport_target(
        &self,
        world: &str,
        id: &str,
        actor: &Actor,
        kind: TeleportKind,
    ) -> Result<Location> {
        let snapshot = self.index(world)?.snapshot();
        let id = RegionId::new(id)?;
        let region = snapshot
            .get(&id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(id.clone()))?;
        let flag = match kind {
            TeleportKind::Teleport => "teleport",
            TeleportKind::Spawn => "spawn",
            TeleportKind::Center => {
                let bounds = region
                    .shape()
                    .bounding_box()
                    .ok_or_else(|| ControlError::NoTeleportLocation(id.to_string()))?;
                let (min, max) = (bounds.min(), bounds.max());
                let middle = |a: i32, b: i32| (f64::from(a) + f64::from(b) + 1.0) / 2.0;
                return Ok(Location {
                    world: Some(world.to_string()),
                    x: middle(min.x, max.x),
                    y: middle(min.y, max.y),
                    z: middle(min.z, max.z),
                    yaw: 0.0,
                    pitch: 0.0,
                });
            }
        };
        let set = snapshot.select(&[id.clone()]);
        let value = FlagValueCalculator::new(&set, self.registry()).region_value(
            &region,
            Some(actor),
            flag,
        );
        match value {
            Some(FlagValue::Location(mut location)) => {
                if location.world.is_none() {
                    location.world = Some(world.to_string());
                }
                Ok(location)
            }
            _ => Err(ControlError::NoTeleportLocation(id.to_string())),
        }
    }

    /// List regions as a task; large worlds are not walked on the caller's
    /// thread.
    pub fn list(
        &self,
        owner: &str,
        world: &str,
        filter: ListFilter,
        page: usize,
    ) -> Result<TaskHandle<ListPage>> {
        let snapshot = self.index(world)?.snapshot();
        let handle = self.supervisor.submit_blocking(
            format!("List regions in {world}"),
            owner,
            SubmitOptions::on(format!("{}:query", world_resource(world))),
            move |_| Ok(list_page(&snapshot, &filter, page)),
        )?;
        Ok(handle)
    }

    /// Set or clear a flag and its group selector in one swap.
    ///
    /// Clearing a flag without naming a group also clears its group flag.
    /// A group equal to the flag's default selector is stored as unset.
    #[instrument(skip(self, value), fields(world = %world))]
    pub fn set_flag(
        &self,
        world: &str,
        id: &str,
        flag: &str,
        value: Option<FlagValue>,
        group: Option<RegionGroup>,
    ) -> Result<FlagChange> {
        let def = self
            .registry()
            .fuzzy_match(flag)
            .ok_or_else(|| RegionError::UnknownFlag(flag.to_string()))?;
        if let Some(value) = &value {
            def.validate(value)?;
        }
        let group_key = def.group_flag_name();
        if group.is_some() && group_key.is_none() {
            return Err(RegionError::NoGroupFlag(def.name.clone()).into());
        }

        let clears_all = value.is_none() && group.is_none();
        let sets_value = value.is_some() || clears_all;
        let mut changes = Vec::new();
        if sets_value {
            changes.push((def.name.clone(), value));
        }
        let mut stored_group = None;
        if let Some(group_key) = group_key {
            if clears_all {
                changes.push((group_key.to_string(), None));
            } else if let Some(group) = group {
                stored_group = (group != def.default_group()).then_some(group);
                changes.push((group_key.to_string(), stored_group.map(FlagValue::from)));
            }
        }

        let (id, previous) = self.edit(world, |index| {
            let region = target(index, id)?;
            let id = region.id().clone();
            let mut replaced = index.set_flags(&id, changes)?;
            let previous = if sets_value {
                replaced.swap_remove(0)
            } else {
                region.flag(&def.name).cloned()
            };
            Ok((id, previous))
        })?;
        info!(region_id = %id, flag = %def.name, "Flag updated");
        Ok(FlagChange {
            flag: def.name.clone(),
            previous,
            group: stored_group,
        })
    }

    pub fn set_priority(&self, world: &str, id: &str, priority: i32) -> Result<()> {
        self.edit(world, |index| {
            let region = target(index, id)?;
            Ok(index.set_priority(region.id(), priority)?)
        })
    }

    /// Set or clear a region's parent. The global region has no parent.
    pub fn set_parent(&self, world: &str, id: &str, parent: Option<&str>) -> Result<()> {
        let child = RegionId::new(id)?;
        if child.is_global() {
            return Err(ControlError::InvalidArgument(
                "the global region cannot have a parent".to_string(),
            ));
        }
        let parent = parent.map(RegionId::new).transpose()?;
        self.edit(world, |index| Ok(index.set_parent(&child, parent.as_ref())?))
    }

    /// Add entries to a region's owners or members; returns how many were new.
    pub fn add_to_domain(
        &self,
        world: &str,
        id: &str,
        role: DomainRole,
        entries: &[DomainEntry],
    ) -> Result<usize> {
        self.edit_domain(world, id, role, |domain| {
            entries.iter().filter(|e| e.add_to(domain)).count()
        })
    }

    /// Remove entries; returns how many were present.
    pub fn remove_from_domain(
        &self,
        world: &str,
        id: &str,
        role: DomainRole,
        entries: &[DomainEntry],
    ) -> Result<usize> {
        self.edit_domain(world, id, role, |domain| {
            entries.iter().filter(|e| e.remove_from(domain)).count()
        })
    }

    /// Empty a region's owners or members; returns how many entries it had.
    pub fn clear_domain(&self, world: &str, id: &str, role: DomainRole) -> Result<usize> {
        self.edit_domain(world, id, role, |domain| {
            let size = domain.size();
            *domain = Domain::new();
            size
        })
    }

    fn edit_domain<T>(
        &self,
        world: &str,
        id: &str,
        role: DomainRole,
        edit: impl FnOnce(&mut Domain) -> T,
    ) -> Result<T> {
        self.edit(world, |index| {
            let region = target(index, id)?;
            Ok(index.update_domains(region.id(), |owners, members| match role {
                DomainRole::Owners => edit(owners),
                DomainRole::Members => edit(members),
            })?)
        })
    }
}

/// Region an edit applies to. Editing the global region creates it.
fn target(index: &RegionIndex, id: &str) -> Result<Arc<Region>> {
    let id = RegionId::new(id)?;
    if id.is_global() {
        return Ok(index.get_or_create_global()?);
    }
    Ok(index.get(&id).ok_or(IndexError::NotFound(id))?)
}

/// Owned regions first, then member regions, then the rest; by id within
/// each group.
fn list_page(snapshot: &RegionSet, filter: &ListFilter, page: usize) -> ListPage {
    let needle = filter.id_contains.as_deref().map(str::to_lowercase);
    let mut rows: Vec<(u8, &Region, bool, bool)> = snapshot
        .iter()
        .filter(|r| {
            needle
                .as_deref()
                .map_or(true, |needle| r.id().key().contains(needle))
        })
        .filter(|r| {
            filter
                .intersecting
                .as_ref()
                .map_or(true, |shape| r.intersects(shape))
        })
        .filter_map(|r| {
            let (owner, member) = match &filter.owner {
                Some(actor) => (r.is_owner(actor), r.is_member(actor)),
                None => (false, false),
            };
            if filter.owner.is_some() && !owner && !(filter.include_members && member) {
                return None;
            }
            let rank = if owner { 0 } else if member { 1 } else { 2 };
            Some((rank, r, owner, member))
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id().cmp(b.1.id())));

    let total = rows.len();
    let pages = total.div_ceil(LIST_PAGE_SIZE);
    let entries = rows
        .into_iter()
        .enumerate()
        .skip(page * LIST_PAGE_SIZE)
        .take(LIST_PAGE_SIZE)
        .map(|(i, (_, region, owner, member))| ListEntry {
            number: i + 1,
            id: region.id().clone(),
            owner,
            member,
        })
        .collect();
    ListPage {
        entries,
        page,
        pages,
        total,
    }
}
