//! JSON lines region storage.
//!
//! Each world is one `<dir>/<world>.jsonl` file holding one region record
//! per line. Reads stream line by line; writes replace the file atomically.

use super::traits::{RecordWriter, RegionDriver, RegionStore};
use super::{checked_world, StagedFile};
use crate::error::{StorageError, StorageResult};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use warden_types::Region;

const EXTENSION: &str = "jsonl";

/// Driver storing one JSON lines file per world
#[derive(Debug, Clone)]
pub struct JsonDriver {
    directory: PathBuf,
}

impl JsonDriver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl RegionDriver for JsonDriver {
    fn name(&self) -> &str {
        "json"
    }

    fn store(&self, world: &str) -> StorageResult<Arc<dyn RegionStore>> {
        let world = checked_world(world)?;
        Ok(Arc::new(JsonStore {
            world: world.to_string(),
            path: self.directory.join(format!("{world}.{EXTENSION}")),
        }))
    }

    fn worlds(&self) -> StorageResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut worlds = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    worlds.push(stem.to_string());
                }
            }
        }
        worlds.sort();
        Ok(worlds)
    }
}

/// One world's JSON lines file
#[derive(Debug)]
pub struct JsonStore {
    world: String,
    path: PathBuf,
}

impl RegionStore for JsonStore {
    fn world(&self) -> &str {
        &self.world
    }

    fn stream(
        &self,
        visit: &mut dyn FnMut(StorageResult<Region>) -> ControlFlow<()>,
    ) -> StorageResult<usize> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No region file yet");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        let mut visited = 0;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<Region>(&line).map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                record: index + 1,
                reason: e.to_string(),
            });
            visited += 1;
            if visit(record).is_break() {
                break;
            }
        }
        Ok(visited)
    }

    fn writer(&self) -> StorageResult<Box<dyn RecordWriter + '_>> {
        Ok(Box::new(JsonWriter {
            staged: StagedFile::new(&self.path),
            pending: String::new(),
            written: 0,
        }))
    }
}

/// Appends encoded lines to a staging file; only `commit` touches the
/// world's file.
struct JsonWriter {
    staged: StagedFile,
    pending: String,
    written: usize,
}

impl RecordWriter for JsonWriter {
    fn write(&mut self, region: &Region) -> StorageResult<()> {
        // Encode fully before touching the buffer so a failure leaves no partial line.
        let line = serde_json::to_string(region)?;
        self.pending.push_str(&line);
        self.pending.push('\n');
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        if !self.pending.is_empty() {
            self.staged.append(self.pending.as_bytes())?;
            self.pending.clear();
        }
        self.staged.sync()
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.flush()?;
        self.staged.commit()
    }

    fn written(&self) -> usize {
        self.written
    }
}
