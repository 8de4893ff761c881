//! Fleet configuration loaded from a TOML file.
//!
//! Missing keys fall back to defaults; a missing file yields
//! [`FleetConfig::default`].

use super::fleet::VehicleKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FleetConfig {
    /// Directory of the sled database.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Restrict the fleet to one company. `None` loads every company.
    #[serde(default)]
    pub company: Option<String>,

    #[serde(default = "default_truck_capacity")]
    pub truck_capacity: u32,

    #[serde(default = "default_van_capacity")]
    pub van_capacity: u32,

    /// File receiving one line per parcel change. Disabled when absent.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("parcels.db")
}

fn default_truck_capacity() -> u32 {
    VehicleKind::Truck.default_capacity()
}

fn default_van_capacity() -> u32 {
    VehicleKind::Van.default_capacity()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            company: None,
            truck_capacity: default_truck_capacity(),
            van_capacity: default_van_capacity(),
            audit_log: None,
        }
    }
}

impl FleetConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str::<FleetConfig>(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;

        if config.truck_capacity == 0 || config.van_capacity == 0 {
            anyhow::bail!("vehicle capacities must be positive");
        }
        Ok(config)
    }

    /// Capacity given to newly registered vehicles of `kind`.
    pub fn capacity_for(&self, kind: VehicleKind) -> u32 {
        match kind {
            VehicleKind::Truck => self.truck_capacity,
            VehicleKind::Van => self.van_capacity,
        }
    }
}
