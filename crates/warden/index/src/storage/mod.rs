//! Region storage backends.
//!
//! A [`RegionDriver`] is one persistence encoding; it hands out a
//! [`RegionStore`] per world. Stores are synchronous and are expected to be
//! driven from supervisor tasks, never from the control thread.

pub mod json;
pub mod memory;
pub mod traits;
pub mod yaml;

pub use json::JsonDriver;
pub use memory::{MemoryDriver, MemoryStore};
pub use traits::{RecordWriter, RegionDriver, RegionStore};
pub use yaml::YamlDriver;

use crate::error::{StorageError, StorageResult};
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reject world names that cannot be mapped to a single path component.
pub(crate) fn checked_world(world: &str) -> StorageResult<&str> {
    let bad = world.is_empty()
        || world == "."
        || world == ".."
        || world.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidWorld(world.to_string()));
    }
    Ok(world)
}

/// Write `bytes` to `path` through a [`StagedFile`], so readers see either
/// the old or the new contents.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut staged = StagedFile::new(path);
    staged.append(bytes)?;
    staged.commit()
}

/// A sibling `.tmp` file that is renamed over its target on commit.
///
/// The temporary file is removed if the staging is dropped uncommitted,
/// including after a failed write or rename.
pub(crate) struct StagedFile {
    target: PathBuf,
    tmp: PathBuf,
    file: Option<BufWriter<File>>,
    committed: bool,
}

impl StagedFile {
    pub(crate) fn new(target: &Path) -> Self {
        Self {
            target: target.to_path_buf(),
            tmp: tmp_path_for(target),
            file: None,
            committed: false,
        }
    }

    fn open(&mut self) -> StorageResult<&mut BufWriter<File>> {
        if self.file.is_none() {
            if let Some(parent) = self.target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = Some(BufWriter::new(File::create(&self.tmp)?));
        }
        self.file
            .as_mut()
            .ok_or_else(|| StorageError::WriteRejected("staging file unavailable".to_string()))
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.open()?.write_all(bytes)?;
        Ok(())
    }

    /// Push appended bytes to disk without publishing them.
    pub(crate) fn sync(&mut self) -> StorageResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
            file.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Publish everything appended. A staging commits once.
    pub(crate) fn commit(&mut self) -> StorageResult<()> {
        self.open()?;
        self.sync()?;
        // Close before renaming.
        self.file = None;
        std::fs::rename(&self.tmp, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file = None;
        if let Err(e) = std::fs::remove_file(&self.tmp) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.tmp.display(), error = %e, "Could not remove staging file");
            }
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
