//! YAML region storage.
//!
//! Each world lives in `<dir>/<world>/regions.yml` as a single document with
//! a `regions` list. The whole document is parsed on read.

use super::traits::{RecordWriter, RegionDriver, RegionStore};
use super::{checked_world, write_atomic};
use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_types::Region;

const FILE_NAME: &str = "regions.yml";

#[derive(Debug, Default, Serialize)]
struct RegionDocument {
    regions: Vec<Region>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    regions: Vec<serde_yaml::Value>,
}

/// Driver storing one YAML document per world directory
#[derive(Debug, Clone)]
pub struct YamlDriver {
    directory: PathBuf,
}

impl YamlDriver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl RegionDriver for YamlDriver {
    fn name(&self) -> &str {
        "yaml"
    }

    fn store(&self, world: &str) -> StorageResult<Arc<dyn RegionStore>> {
        let world = checked_world(world)?;
        Ok(Arc::new(YamlStore {
            world: world.to_string(),
            path: self.directory.join(world).join(FILE_NAME),
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
            if path.join(FILE_NAME).is_file() {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    worlds.push(name.to_string());
                }
            }
        }
        worlds.sort();
        Ok(worlds)
    }
}

/// One world's YAML document
#[derive(Debug)]
pub struct YamlStore {
    world: String,
    path: PathBuf,
}

impl RegionStore for YamlStore {
    fn world(&self) -> &str {
        &self.world
    }

    fn stream(
        &self,
        visit: &mut dyn FnMut(StorageResult<Region>) -> ControlFlow<()>,
    ) -> StorageResult<usize> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        // Records are decoded one by one so a bad entry does not hide the rest.
        let document: RawDocument = if text.trim().is_empty() {
            RawDocument::default()
        } else {
            serde_yaml::from_str(&text)?
        };
        let mut visited = 0;
        for (index, value) in document.regions.into_iter().enumerate() {
            let record = serde_yaml::from_value::<Region>(value).map_err(|e| StorageError::Corrupt {
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
        Ok(Box::new(YamlWriter {
            path: &self.path,
            document: RegionDocument::default(),
        }))
    }
}

struct YamlWriter<'a> {
    path: &'a Path,
    document: RegionDocument,
}

impl RecordWriter for YamlWriter<'_> {
    fn write(&mut self, region: &Region) -> StorageResult<()> {
        self.document.regions.push(region.clone());
        Ok(())
    }

    /// The document is written whole, so staging stays in memory.
    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        let text = serde_yaml::to_string(&self.document)?;
        write_atomic(self.path, text.as_bytes())
    }

    fn written(&self) -> usize {
        self.document.regions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{BlockPoint, FlagValue, RegionGroup, RegionId, Shape, StateValue};

    #[test]
    fn test_round_trip_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        let driver = YamlDriver::new(dir.path());
        let store = driver.store("nether").unwrap();
        let mut region = Region::new(
            RegionId::new("fort").unwrap(),
            Shape::cuboid(BlockPoint::new(-5, 0, -5), BlockPoint::new(5, 40, 5)),
        )
        .unwrap()
        .with_flag("build", StateValue::Deny.into())
        .with_flag("build-group", RegionGroup::NonMembers.into())
        .with_flag("heal-amount", FlagValue::Double(1.5));
        region.members_mut().add_group("guards");
        let saved = vec![region, Region::global().with_priority(2)];
        store.save_all(&mut saved.iter()).unwrap();
        assert_eq!(store.load_all().unwrap(), saved);
        assert_eq!(driver.worlds().unwrap(), vec!["nether".to_string()]);
    }

    #[test]
    fn test_bad_entry_is_reported_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let driver = YamlDriver::new(dir.path());
        let store = driver.store("world").unwrap();
        let good = Region::new(
            RegionId::new("good").unwrap(),
            Shape::cuboid(BlockPoint::new(0, 0, 0), BlockPoint::new(1, 1, 1)),
        )
        .unwrap();
        store.save_all(&mut [good.clone()].iter()).unwrap();
        let path = dir.path().join("world").join(FILE_NAME);
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("regions:\n", "regions:\n- id: 12\n")).unwrap();

        let mut seen = Vec::new();
        store
            .stream(&mut |record| {
                seen.push(record.map(|r| r.id().clone()).map_err(|e| e.to_string()));
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].as_ref().is_err_and(|e| e.contains("Corrupt record 1")));
        assert_eq!(seen[1].as_ref().unwrap(), good.id());
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlDriver::new(dir.path()).store("world").unwrap();
        assert_eq!(store.stream(&mut |_| ControlFlow::Continue(())).unwrap(), 0);
    }
}
