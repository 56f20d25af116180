//! Coarse 2D spatial grid over region footprints
//!
//! Each region's bounding box is bucketed into square cells of
//! `1 << shift` blocks. Regions without a footprint (global) or whose
//! footprint spans more than [`MAX_CELLS_PER_REGION`] cells are kept in a
//! list that every query scans.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use warden_types::{BlockPoint, Cuboid, Region};

/// Footprints larger than this many cells are not bucketed.
pub const MAX_CELLS_PER_REGION: i64 = 4096;

/// Default cell size exponent (256-block cells)
pub const DEFAULT_CELL_SHIFT: u32 = 8;

#[derive(Debug, Clone)]
pub(crate) struct SpatialGrid {
    shift: u32,
    cells: HashMap<(i32, i32), Vec<usize>>,
    wide: Vec<usize>,
}

impl SpatialGrid {
    pub(crate) fn build(regions: &[Arc<Region>], shift: u32) -> Self {
        let mut grid = Self {
            shift,
            cells: HashMap::new(),
            wide: Vec::new(),
        };
        for (pos, region) in regions.iter().enumerate() {
            match region.shape().bounding_box() {
                Some(bounds) if grid.cell_count(&bounds) <= MAX_CELLS_PER_REGION => {
                    let ((x0, z0), (x1, z1)) = grid.cell_range(&bounds);
                    for cx in x0..=x1 {
                        for cz in z0..=z1 {
                            grid.cells.entry((cx, cz)).or_default().push(pos);
                        }
                    }
                }
                _ => grid.wide.push(pos),
            }
        }
        grid
    }

    fn cell_range(&self, bounds: &Cuboid) -> ((i32, i32), (i32, i32)) {
        (
            (bounds.min().x >> self.shift, bounds.min().z >> self.shift),
            (bounds.max().x >> self.shift, bounds.max().z >> self.shift),
        )
    }

    fn cell_count(&self, bounds: &Cuboid) -> i64 {
        let ((x0, z0), (x1, z1)) = self.cell_range(bounds);
        (x1 as i64 - x0 as i64 + 1) * (z1 as i64 - z0 as i64 + 1)
    }

    /// Candidate positions for a point, ascending.
    pub(crate) fn candidates_at(&self, point: BlockPoint) -> Vec<usize> {
        let cell = (point.x >> self.shift, point.z >> self.shift);
        let mut out: Vec<usize> = self
            .cells
            .get(&cell)
            .into_iter()
            .flatten()
            .chain(self.wide.iter())
            .copied()
            .collect();
        out.sort_unstable();
        out
    }

    /// Candidate positions for an area, ascending; `None` means every region.
    pub(crate) fn candidates_in(&self, bounds: Option<&Cuboid>) -> Option<Vec<usize>> {
        let bounds = bounds?;
        if self.cell_count(bounds) > MAX_CELLS_PER_REGION {
            return None;
        }
        let ((x0, z0), (x1, z1)) = self.cell_range(bounds);
        let mut out: BTreeSet<usize> = self.wide.iter().copied().collect();
        for cx in x0..=x1 {
            for cz in z0..=z1 {
                if let Some(bucket) = self.cells.get(&(cx, cz)) {
                    out.extend(bucket.iter().copied());
                }
            }
        }
        Some(out.into_iter().collect())
    }
}
