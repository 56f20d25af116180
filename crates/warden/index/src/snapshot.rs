//! Immutable published view of one world's regions
//!
//! A [`RegionSet`] is never mutated after it is published. The index builds
//! a fresh set for every mutation and swaps the shared reference, so readers
//! holding an `Arc<RegionSet>` always see one consistent state.

use crate::applicable::ApplicableRegionSet;
use crate::grid::SpatialGrid;
use std::collections::HashMap;
use std::sync::Arc;
use warden_types::{Actor, BlockPoint, Region, RegionId, Shape};

/// Upper bound on parent chain walks; longer chains are treated as broken.
pub const MAX_PARENT_DEPTH: usize = 1024;

/// Snapshot of every region in a world, in insertion order
#[derive(Debug, Clone)]
pub struct RegionSet {
    world: String,
    regions: Vec<Arc<Region>>,
    positions: HashMap<String, usize>,
    grid: SpatialGrid,
    cell_shift: u32,
}

impl RegionSet {
    pub(crate) fn build(world: String, regions: Vec<Arc<Region>>, cell_shift: u32) -> Self {
        let positions = regions
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id().key().to_string(), pos))
            .collect();
        let grid = SpatialGrid::build(&regions, cell_shift);
        Self {
            world,
            regions,
            positions,
            grid,
            cell_shift,
        }
    }

    pub(crate) fn empty(world: String, cell_shift: u32) -> Self {
        Self::build(world, Vec::new(), cell_shift)
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub(crate) fn cell_shift(&self) -> u32 {
        self.cell_shift
    }

    pub fn get(&self, id: &RegionId) -> Option<&Arc<Region>> {
        self.position(id).map(|pos| &self.regions[pos])
    }

    pub fn contains(&self, id: &RegionId) -> bool {
        self.positions.contains_key(id.key())
    }

    /// Insertion position of a region.
    pub fn position(&self, id: &RegionId) -> Option<usize> {
        self.positions.get(id.key()).copied()
    }

    pub(crate) fn at(&self, pos: usize) -> &Region {
        &self.regions[pos]
    }

    /// All regions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().map(Arc::as_ref)
    }

    pub(crate) fn arcs(&self) -> &[Arc<Region>] {
        &self.regions
    }

    /// Resolve a region's parent within this snapshot.
    pub fn parent_of(&self, region: &Region) -> Option<&Region> {
        region
            .parent()
            .and_then(|id| self.get(id))
            .map(Arc::as_ref)
    }

    /// Ancestors of a region, nearest first, bounded by [`MAX_PARENT_DEPTH`].
    pub fn ancestors<'a>(&'a self, region: &'a Region) -> impl Iterator<Item = &'a Region> + 'a {
        let mut current = self.parent_of(region);
        let mut depth = 0;
        std::iter::from_fn(move || {
            if depth >= MAX_PARENT_DEPTH {
                return None;
            }
            depth += 1;
            let next = current?;
            current = self.parent_of(next);
            Some(next)
        })
    }

    /// Direct children of a region, in insertion order.
    pub fn children_of(&self, id: &RegionId) -> Vec<RegionId> {
        self.iter()
            .filter(|r| r.parent() == Some(id))
            .map(|r| r.id().clone())
            .collect()
    }

    /// Regions containing a point, ordered for flag resolution.
    pub fn applicable_at(self: &Arc<Self>, point: BlockPoint) -> ApplicableRegionSet {
        let hits = self
            .grid
            .candidates_at(point)
            .into_iter()
            .filter(|&pos| self.regions[pos].contains(point))
            .collect();
        ApplicableRegionSet::new(Arc::clone(self), hits)
    }

    /// Regions intersecting a shape, ordered for flag resolution.
    pub fn applicable_in(self: &Arc<Self>, shape: &Shape) -> ApplicableRegionSet {
        let candidates = self
            .grid
            .candidates_in(shape.bounding_box().as_ref())
            .unwrap_or_else(|| (0..self.regions.len()).collect());
        let hits = candidates
            .into_iter()
            .filter(|&pos| self.regions[pos].intersects(shape))
            .collect();
        ApplicableRegionSet::new(Arc::clone(self), hits)
    }

    /// An explicit selection of regions, ordered like a query result.
    /// Unknown ids are skipped.
    pub fn select(self: &Arc<Self>, ids: &[RegionId]) -> ApplicableRegionSet {
        let mut hits: Vec<usize> = ids.iter().filter_map(|id| self.position(id)).collect();
        hits.sort_unstable();
        hits.dedup();
        ApplicableRegionSet::new(Arc::clone(self), hits)
    }

    /// Regions the actor owns, or owns or is a member of.
    pub fn owned_by<'a>(
        &'a self,
        actor: &'a Actor,
        include_members: bool,
    ) -> impl Iterator<Item = &'a Region> + 'a {
        self.iter().filter(move |r| {
            if include_members {
                r.is_member(actor)
            } else {
                r.is_owner(actor)
            }
        })
    }
}
