//! In-memory region storage.

use super::traits::{RecordWriter, RegionDriver, RegionStore};
use crate::error::{StorageError, StorageResult};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use warden_types::Region;

/// In-process driver, mainly for tests and migrations into scratch space.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    stores: DashMap<String, Arc<MemoryStore>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete store for a world, created empty on first use.
    pub fn memory_store(&self, world: &str) -> Arc<MemoryStore> {
        self.stores
            .entry(world.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new(world)))
            .clone()
    }
}

impl RegionDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn store(&self, world: &str) -> StorageResult<Arc<dyn RegionStore>> {
        Ok(self.memory_store(world))
    }

    fn worlds(&self) -> StorageResult<Vec<String>> {
        let mut worlds: Vec<String> = self
            .stores
            .iter()
            .filter(|entry| entry.value().records.read().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        worlds.sort();
        Ok(worlds)
    }
}

/// Regions of one world held in memory
#[derive(Debug)]
pub struct MemoryStore {
    world: String,
    records: RwLock<Option<Vec<Region>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            records: RwLock::new(None),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent commit fail, leaving stored data untouched.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored records.
    pub fn stored_len(&self) -> usize {
        self.records.read().as_ref().map_or(0, Vec::len)
    }
}

impl RegionStore for MemoryStore {
    fn world(&self) -> &str {
        &self.world
    }

    fn stream(
        &self,
        visit: &mut dyn FnMut(StorageResult<Region>) -> ControlFlow<()>,
    ) -> StorageResult<usize> {
        let records = self.records.read().clone().unwrap_or_default();
        let mut visited = 0;
        for region in records {
            visited += 1;
            if visit(Ok(region)).is_break() {
                break;
            }
        }
        Ok(visited)
    }

    fn writer(&self) -> StorageResult<Box<dyn RecordWriter + '_>> {
        Ok(Box::new(MemoryWriter {
            store: self,
            buffer: Vec::new(),
        }))
    }
}

struct MemoryWriter<'a> {
    store: &'a MemoryStore,
    buffer: Vec<Region>,
}

impl RecordWriter for MemoryWriter<'_> {
    fn write(&mut self, region: &Region) -> StorageResult<()> {
        self.buffer.push(region.clone());
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        if self.store.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected(format!(
                "memory store '{}' is read-only",
                self.store.world
            )));
        }
        *self.store.records.write() = Some(self.buffer.clone());
        Ok(())
    }

    fn written(&self) -> usize {
        self.buffer.len()
    }
}
