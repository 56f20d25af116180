//! Container configuration
//!
//! ```toml
//! [supervisor]
//! workers = 4
//!
//! [storage]
//! driver = "json"
//! directory = "regions"
//!
//! [regions]
//! max_region_count_per_player = 7
//!
//! [worlds.nether]
//! use_regions = false
//! ```

use crate::error::{ControlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_index::{JsonDriver, MemoryDriver, RegionDriver, YamlDriver, DEFAULT_CELL_SHIFT};
use warden_migration::{UnresolvedPolicy, DEFAULT_FLUSH_BATCH};
use warden_supervisor::SupervisorConfig;

/// Full container configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub supervisor: SupervisorConfig,
    pub storage: StorageConfig,
    /// Settings for every world without an override
    pub regions: RegionSettings,
    /// Per-world overrides of [`RegionSettings`]
    pub worlds: BTreeMap<String, WorldOverrides>,
}

impl WardenConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ControlError::Config(e.to_string()))
    }

    /// Effective settings for a world.
    pub fn world(&self, name: &str) -> RegionSettings {
        match self.worlds.get(name) {
            Some(overrides) => overrides.apply(&self.regions),
            None => self.regions.clone(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Json,
    Yaml,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub driver: DriverKind,
    /// Root directory for file-based drivers
    pub directory: PathBuf,
    /// Records written between flushes during driver migrations
    pub flush_batch: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Json,
            directory: PathBuf::from("regions"),
            flush_batch: DEFAULT_FLUSH_BATCH,
        }
    }
}

impl StorageConfig {
    /// Build the configured driver.
    pub fn open(&self) -> Arc<dyn RegionDriver> {
        match self.driver {
            DriverKind::Json => Arc::new(JsonDriver::new(self.directory.clone())),
            DriverKind::Yaml => Arc::new(YamlDriver::new(self.directory.clone())),
            DriverKind::Memory => Arc::new(MemoryDriver::new()),
        }
    }
}

/// Per-world region behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    pub use_regions: bool,
    /// Regions a player may own before claims are refused; negative means
    /// unlimited
    pub max_region_count_per_player: i64,
    /// Largest claim in blocks
    pub max_claim_volume: u64,
    pub claim_only_inside_existing_regions: bool,
    /// Parent given to every newly claimed region
    pub set_parent_on_claim: Option<String>,
    /// Whether identity migrations keep names they cannot resolve
    pub keep_unresolved_names: bool,
    pub grid_cell_shift: u32,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            use_regions: true,
            max_region_count_per_player: 7,
            max_claim_volume: 30_000,
            claim_only_inside_existing_regions: false,
            set_parent_on_claim: None,
            keep_unresolved_names: true,
            grid_cell_shift: DEFAULT_CELL_SHIFT,
        }
    }
}

impl RegionSettings {
    pub fn max_region_count(&self) -> Option<u64> {
        u64::try_from(self.max_region_count_per_player).ok()
    }

    pub fn unresolved_policy(&self) -> UnresolvedPolicy {
        if self.keep_unresolved_names {
            UnresolvedPolicy::KeepNames
        } else {
            UnresolvedPolicy::Drop
        }
    }
}

/// Keys a world may override; unset keys fall back to `[regions]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldOverrides {
    pub use_regions: Option<bool>,
    pub max_region_count_per_player: Option<i64>,
    pub max_claim_volume: Option<u64>,
    pub claim_only_inside_existing_regions: Option<bool>,
    pub set_parent_on_claim: Option<String>,
    pub keep_unresolved_names: Option<bool>,
    pub grid_cell_shift: Option<u32>,
}

impl WorldOverrides {
    fn apply(&self, base: &RegionSettings) -> RegionSettings {
        RegionSettings {
            use_regions: self.use_regions.unwrap_or(base.use_regions),
            max_region_count_per_player: self
                .max_region_count_per_player
                .unwrap_or(base.max_region_count_per_player),
            max_claim_volume: self.max_claim_volume.unwrap_or(base.max_claim_volume),
            claim_only_inside_existing_regions: self
                .claim_only_inside_existing_regions
                .unwrap_or(base.claim_only_inside_existing_regions),
            set_parent_on_claim: self
                .set_parent_on_claim
                .clone()
                .or_else(|| base.set_parent_on_claim.clone()),
            keep_unresolved_names: self
                .keep_unresolved_names
                .unwrap_or(base.keep_unresolved_names),
            grid_cell_shift: self.grid_cell_shift.unwrap_or(base.grid_cell_shift),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WardenConfig::default();
        assert_eq!(config.supervisor.workers, 4);
        assert_eq!(config.storage.driver, DriverKind::Json);
        assert_eq!(config.regions.max_region_count(), Some(7));
        assert!(config.regions.use_regions);
    }

    #[test]
    fn test_load_missing_config() {
        let config = WardenConfig::load("/nonexistent/path/warden.toml").unwrap();
        assert_eq!(config, WardenConfig::default());
    }

    #[test]
    fn test_world_overrides_merge() {
        let config = WardenConfig::from_toml_str(
            r#"
            [storage]
            driver = "yaml"

            [regions]
            max_region_count_per_player = -1
            set_parent_on_claim = "claims"

            [worlds.nether]
            use_regions = false

            [worlds.creative]
            max_claim_volume = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.driver, DriverKind::Yaml);
        assert_eq!(config.storage.flush_batch, DEFAULT_FLUSH_BATCH);
        assert!(!config.world("nether").use_regions);
        let creative = config.world("creative");
        assert_eq!(creative.max_claim_volume, 500);
        assert_eq!(creative.max_region_count(), None);
        assert_eq!(creative.set_parent_on_claim.as_deref(), Some("claims"));
        assert_eq!(config.world("overworld"), config.regions);
    }

    #[test]
    fn test_bad_toml_is_a_config_error() {
        let err = WardenConfig::from_toml_str("[storage]\ndriver = \"floppy\"").unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
    }
}
