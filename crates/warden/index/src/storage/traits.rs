//! Storage trait definitions.

use crate::error::StorageResult;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use warden_types::Region;

/// One persistence encoding, covering every world it knows about.
pub trait RegionDriver: Send + Sync + fmt::Debug {
    /// Short name used in configuration and logs.
    fn name(&self) -> &str;

    /// Store for a single world. Opening a store never creates data.
    fn store(&self, world: &str) -> StorageResult<Arc<dyn RegionStore>>;

    /// Worlds that currently have stored data.
    fn worlds(&self) -> StorageResult<Vec<String>>;
}

/// Persisted regions of one world.
pub trait RegionStore: Send + Sync {
    fn world(&self) -> &str;

    /// Visit stored records one at a time, in stored order.
    ///
    /// A record that cannot be decoded is handed to the visitor as
    /// [`StorageError::Corrupt`](crate::StorageError::Corrupt) and streaming continues with the next one.
    /// Failures that end the read, such as I/O errors, are returned instead.
    /// The visitor may stop early with [`ControlFlow::Break`]. Returns the
    /// number of records visited.
    fn stream(
        &self,
        visit: &mut dyn FnMut(StorageResult<Region>) -> ControlFlow<()>,
    ) -> StorageResult<usize>;

    /// Begin a replacement of the stored records.
    ///
    /// Nothing is visible to readers until [`RecordWriter::commit`], which
    /// atomically replaces the stored data with every record written.
    fn writer(&self) -> StorageResult<Box<dyn RecordWriter + '_>>;

    /// Load every record, failing on the first corrupt one.
    fn load_all(&self) -> StorageResult<Vec<Region>> {
        let mut regions = Vec::new();
        let mut corrupt = None;
        self.stream(&mut |record| match record {
            Ok(region) => {
                regions.push(region);
                ControlFlow::Continue(())
            }
            Err(e) => {
                corrupt = Some(e);
                ControlFlow::Break(())
            }
        })?;
        match corrupt {
            Some(e) => Err(e),
            None => Ok(regions),
        }
    }

    /// Replace the stored records in a single commit.
    fn save_all(&self, regions: &mut dyn Iterator<Item = &Region>) -> StorageResult<usize> {
        let mut writer = self.writer()?;
        for region in regions {
            writer.write(region)?;
        }
        writer.commit()?;
        Ok(writer.written())
    }
}

/// Staged record sink returned by [`RegionStore::writer`].
///
/// Dropping a writer without committing discards everything it staged.
pub trait RecordWriter: Send {
    /// Stage one record. Records are never split.
    fn write(&mut self, region: &Region) -> StorageResult<()>;

    /// Move staged records out of memory into durable staging. Readers still
    /// see the previous data.
    fn flush(&mut self) -> StorageResult<()>;

    /// Atomically replace the stored data with every record written.
    fn commit(&mut self) -> StorageResult<()>;

    /// Records written so far.
    fn written(&self) -> usize;
}
