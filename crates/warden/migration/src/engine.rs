//! Per-world streaming copy shared by every migration
//!
//! Records are read one at a time from the source, transformed, and written
//! to a staged destination writer. Cancellation is checked between records,
//! so a record is either written whole or not at all. The destination only
//! changes when the pass commits.

use crate::error::{MigrationReport, RecordFailure, Result};
use std::ops::ControlFlow;
use tracing::{debug, info, warn};
use warden_index::{RegionStore, StorageError};
use warden_supervisor::CancelToken;
use warden_types::Region;

/// Outcome of transforming one record
pub(crate) enum Step {
    Write(Region),
    /// The original record and why it could not be transformed
    Fail(Region, String),
}

/// How to copy one world
pub(crate) struct WorldPass<'a> {
    pub world: &'a str,
    pub source: &'a dyn RegionStore,
    pub destination: &'a dyn RegionStore,
    pub cancel: &'a CancelToken,
    /// Move staged records to disk after this many; `None` keeps them in
    /// memory until the commit
    pub flush_every: Option<usize>,
    /// Source and destination are the same data. Records that are not
    /// migrated are written back unchanged so nothing is lost.
    pub in_place: bool,
}

impl WorldPass<'_> {
    pub fn run(
        &self,
        transform: &mut dyn FnMut(Region) -> Step,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let world = self.world.to_string();
        report.worlds.push(world.clone());
        let mut writer = self.destination.writer()?;
        let mut write_error: Option<StorageError> = None;
        let mut abandoned = false;
        let mut since_flush = 0usize;
        let migrated_before = report.migrated.len();

        self.source.stream(&mut |record| {
            let region = match record {
                Ok(region) => region,
                Err(e) => {
                    warn!(world = %world, error = %e, "Undecodable region record");
                    let mut reason = e.to_string();
                    if self.in_place {
                        // The raw record cannot be written back, so the world is left as stored.
                        reason.push_str("; world left unchanged");
                        abandoned = true;
                    }
                    report.failures.push(RecordFailure {
                        world: world.clone(),
                        region: None,
                        reason,
                    });
                    return if abandoned {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    };
                }
            };

            if !report.cancelled && self.cancel.is_cancelled() {
                info!(world = %world, "Migration cancelled, finishing at region boundary");
                report.cancelled = true;
            }
            if report.cancelled {
                report.skipped.push((world.clone(), region.id().clone()));
                if self.in_place {
                    if let Err(e) = writer.write(&region) {
                        write_error = Some(e);
                        return ControlFlow::Break(());
                    }
                }
                return ControlFlow::Continue(());
            }

            let id = region.id().clone();
            let outcome = match transform(region) {
                Step::Write(region) => writer.write(&region).map_err(|e| (None, e.to_string())),
                Step::Fail(original, reason) => Err((Some(original), reason)),
            };
            match outcome {
                Ok(()) => {
                    report.migrated.push((world.clone(), id));
                    since_flush += 1;
                }
                Err((original, reason)) => {
                    warn!(world = %world, region_id = %id, %reason, "Region not migrated");
                    if self.in_place {
                        if let Some(original) = original {
                            if let Err(e) = writer.write(&original) {
                                write_error = Some(e);
                                return ControlFlow::Break(());
                            }
                        }
                    }
                    report.failures.push(RecordFailure {
                        world: world.clone(),
                        region: Some(id),
                        reason,
                    });
                }
            }

            if let Some(batch) = self.flush_every {
                if since_flush >= batch {
                    if let Err(e) = writer.flush() {
                        write_error = Some(e);
                        return ControlFlow::Break(());
                    }
                    debug!(world = %world, written = writer.written(), "Batch staged");
                    since_flush = 0;
                }
            }
            ControlFlow::Continue(())
        })?;

        if let Some(e) = write_error {
            return Err(e.into());
        }
        if abandoned {
            let undone = report.migrated.split_off(migrated_before);
            warn!(world = %world, undone = undone.len(), "World left unchanged");
            report.skipped.extend(undone);
            return Ok(());
        }
        let migrated_here = report.migrated.len() - migrated_before;
        if report.cancelled && migrated_here == 0 {
            // Nothing new to persist; leave the destination as it was.
            return Ok(());
        }
        writer.commit()?;
        info!(world = %world, migrated = migrated_here, "World migrated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_index::MemoryStore;
    use warden_supervisor::CancelCause;
    use warden_types::{BlockPoint, RegionId, Shape};

    fn region(id: &str) -> Region {
        Region::new(
            RegionId::new(id).unwrap(),
            Shape::cuboid(BlockPoint::new(0, 0, 0), BlockPoint::new(1, 1, 1)),
        )
        .unwrap()
    }

    fn seeded(ids: &[&str]) -> MemoryStore {
        let store = MemoryStore::new("world");
        let regions: Vec<Region> = ids.iter().map(|id| region(id)).collect();
        store.save_all(&mut regions.iter()).unwrap();
        store
    }

    #[test]
    fn test_cancel_mid_stream_leaves_prefix() {
        let source = seeded(&["a", "b", "c", "d"]);
        let destination = MemoryStore::new("world");
        let cancel = CancelToken::new();
        let pass = WorldPass {
            world: "world",
            source: &source,
            destination: &destination,
            cancel: &cancel,
            flush_every: Some(1),
            in_place: false,
        };
        let mut report = MigrationReport::default();
        let mut seen = 0;
        pass.run(
            &mut |r| {
                seen += 1;
                if seen == 2 {
                    cancel.cancel(CancelCause::User);
                }
                Step::Write(r)
            },
            &mut report,
        )
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.migrated.len(), 2);
        assert_eq!(report.skipped.len(), 2);
        let stored: Vec<String> = destination
            .load_all()
            .unwrap()
            .iter()
            .map(|r| r.id().as_str().to_string())
            .collect();
        assert_eq!(stored, vec!["a", "b"]);
    }

    #[test]
    fn test_in_place_keeps_failed_and_skipped_records() {
        let store = seeded(&["a", "b", "c"]);
        let cancel = CancelToken::new();
        let pass = WorldPass {
            world: "world",
            source: &store,
            destination: &store,
            cancel: &cancel,
            flush_every: None,
            in_place: true,
        };
        let mut report = MigrationReport::default();
        pass.run(
            &mut |r| {
                if r.id().as_str() == "b" {
                    Step::Fail(r, "bad".into())
                } else {
                    Step::Write(r.with_priority(1))
                }
            },
            &mut report,
        )
        .unwrap();
        assert_eq!(report.failures.len(), 1);
        let stored = store.load_all().unwrap();
        let priorities: Vec<i32> = stored.iter().map(|r| r.priority()).collect();
        assert_eq!(priorities, vec![1, 0, 1]);
    }

    #[test]
    fn test_in_place_pass_abandons_world_with_undecodable_record() {
        struct Patchy(MemoryStore);
        impl RegionStore for Patchy {
            fn world(&self) -> &str {
                self.0.world()
            }
            fn stream(
                &self,
                visit: &mut dyn FnMut(warden_index::StorageResult<Region>) -> ControlFlow<()>,
            ) -> warden_index::StorageResult<usize> {
                let mut seen = self.0.stream(&mut |record| visit(record))?;
                seen += 1;
                let _ = visit(Err(StorageError::WriteRejected("garbled".into())));
                Ok(seen)
            }
            fn writer(&self) -> warden_index::StorageResult<Box<dyn warden_index::RecordWriter + '_>> {
                self.0.writer()
            }
        }

        let store = Patchy(seeded(&["a", "b"]));
        let cancel = CancelToken::new();
        let pass = WorldPass {
            world: "world",
            source: &store,
            destination: &store,
            cancel: &cancel,
            flush_every: None,
            in_place: true,
        };
        let mut report = MigrationReport::default();
        pass.run(&mut |r| Step::Write(r.with_priority(9)), &mut report)
            .unwrap();
        assert!(report.migrated.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].region.is_none());
        let priorities: Vec<i32> = store.0.load_all().unwrap().iter().map(|r| r.priority()).collect();
        assert_eq!(priorities, vec![0, 0]);
    }

    #[test]
    fn test_cancelled_before_start_writes_nothing() {
        let source = seeded(&["a"]);
        let destination = seeded(&["existing"]);
        let cancel = CancelToken::new();
        cancel.cancel(CancelCause::User);
        let pass = WorldPass {
            world: "world",
            source: &source,
            destination: &destination,
            cancel: &cancel,
            flush_every: Some(10),
            in_place: false,
        };
        let mut report = MigrationReport::default();
        pass.run(&mut Step::Write, &mut report).unwrap();
        assert_eq!(destination.load_all().unwrap()[0].id().as_str(), "existing");
    }
}
