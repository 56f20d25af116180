//! World height migration
//!
//! Moves every region's vertical bounds from an old world height range to a
//! new one, rewriting each world in place.

use crate::engine::{Step, WorldPass};
use crate::error::{MigrationReport, Result};
use crate::{conclude, target_worlds, Migration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use warden_index::RegionDriver;
use warden_supervisor::CancelToken;
use warden_types::{BlockPoint, Region, Shape};

/// Inclusive vertical build range of a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRange {
    pub min: i32,
    pub max: i32,
}

impl HeightRange {
    /// Bounds are reordered if given backwards.
    pub fn new(a: i32, b: i32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    fn clamp(&self, y: i32) -> i32 {
        y.clamp(self.min, self.max)
    }
}

/// How region bounds follow the world's range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightStrategy {
    /// Move every region by the change in the world floor.
    #[default]
    Shift,
    /// Stretch regions that covered the whole old range to the whole new
    /// range; clamp the rest.
    ExpandFullHeight,
}

pub struct HeightMigration {
    driver: Arc<dyn RegionDriver>,
    from: HeightRange,
    to: HeightRange,
    strategy: HeightStrategy,
    worlds: Option<Vec<String>>,
}

impl HeightMigration {
    pub fn new(
        driver: Arc<dyn RegionDriver>,
        from: HeightRange,
        to: HeightRange,
        strategy: HeightStrategy,
    ) -> Self {
        Self {
            driver,
            from,
            to,
            strategy,
            worlds: None,
        }
    }

    pub fn only_worlds(mut self, worlds: Vec<String>) -> Self {
        self.worlds = Some(worlds);
        self
    }

    /// New vertical bounds for a region spanning `min_y..=max_y`.
    pub fn map_bounds(&self, min_y: i32, max_y: i32) -> (i32, i32) {
        let (lo, hi) = match self.strategy {
            HeightStrategy::Shift => {
                let delta = self.to.min as i64 - self.from.min as i64;
                (shift(min_y, delta), shift(max_y, delta))
            }
            HeightStrategy::ExpandFullHeight
                if min_y <= self.from.min && max_y >= self.from.max =>
            {
                (self.to.min, self.to.max)
            }
            HeightStrategy::ExpandFullHeight => (min_y, max_y),
        };
        let (lo, hi) = (self.to.clamp(lo), self.to.clamp(hi));
        (lo.min(hi), lo.max(hi))
    }

    fn rebound(&self, region: Region) -> Step {
        let shape = match region.shape() {
            Shape::Global => return Step::Write(region),
            Shape::Cuboid(c) => {
                let (min_y, max_y) = self.map_bounds(c.min().y, c.max().y);
                let (lo, hi) = (c.min(), c.max());
                Shape::cuboid(
                    BlockPoint::new(lo.x, min_y, lo.z),
                    BlockPoint::new(hi.x, max_y, hi.z),
                )
            }
            Shape::Polygon(p) => {
                let (min_y, max_y) = self.map_bounds(p.min_y(), p.max_y());
                Shape::Polygon(p.with_heights(min_y, max_y))
            }
        };
        match region.clone().with_shape(shape) {
            Ok(updated) => Step::Write(updated),
            Err(e) => Step::Fail(region, e.to_string()),
        }
    }
}

fn shift(y: i32, delta: i64) -> i32 {
    (y as i64 + delta).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Migration for HeightMigration {
    fn name(&self) -> &str {
        "heights"
    }

    #[instrument(skip(self, cancel), fields(strategy = ?self.strategy))]
    fn run(&self, cancel: &CancelToken) -> Result<MigrationReport> {
        let worlds = target_worlds(&self.driver, &self.worlds)?;
        let mut report = MigrationReport::default();
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
            pass.run(&mut |region| self.rebound(region), &mut report)?;
        }
        conclude(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_index::MemoryDriver;

    fn migration(strategy: HeightStrategy) -> HeightMigration {
        HeightMigration::new(
            Arc::new(MemoryDriver::new()),
            HeightRange::new(0, 255),
            HeightRange::new(-64, 319),
            strategy,
        )
    }

    #[test]
    fn test_shift_moves_by_floor_delta() {
        let m = migration(HeightStrategy::Shift);
        assert_eq!(m.map_bounds(60, 70), (-4, 6));
        assert_eq!(m.map_bounds(0, 255), (-64, 191));
    }

    #[test]
    fn test_expand_only_stretches_full_height() {
        let m = migration(HeightStrategy::ExpandFullHeight);
        assert_eq!(m.map_bounds(0, 255), (-64, 319));
        assert_eq!(m.map_bounds(60, 70), (60, 70));
    }

    #[test]
    fn test_shrinking_range_clamps_without_inverting() {
        let m = HeightMigration::new(
            Arc::new(MemoryDriver::new()),
            HeightRange::new(-64, 319),
            HeightRange::new(0, 100),
            HeightStrategy::Shift,
        );
        let (lo, hi) = m.map_bounds(200, 300);
        assert_eq!((lo, hi), (100, 100));
        assert!(lo <= hi);
    }

    #[test]
    fn test_range_reorders_bounds() {
        assert_eq!(HeightRange::new(10, -10), HeightRange { min: -10, max: 10 });
    }
}
