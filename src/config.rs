use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const WILDCARD_DEVICE_ID: &str = "*";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Device IDs (without the leading `!`) whose precise location is
    /// recorded. `"*"` allows every device.
    pub allowed_device_ids: Vec<String>,
    pub gpx_directory: PathBuf,
    pub log_global_coverage: bool,
    /// Decimal digits kept for coverage points. Values below 4 are raised to
    /// 4 when a point is anonymized.
    pub coverage_resolution: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            allowed_device_ids: vec![WILDCARD_DEVICE_ID.to_string()],
            gpx_directory: PathBuf::from("./data/gpx_data"),
            log_global_coverage: false,
            coverage_resolution: 4,
        }
    }
}

impl TrackerConfig {
    pub fn is_device_allowed(&self, device_id: &str) -> bool {
        self.allowed_device_ids
            .iter()
            .any(|id| id == WILDCARD_DEVICE_ID || id == device_id)
    }

    pub fn device_file_path(&self, device_id: &str) -> PathBuf {
        self.gpx_directory.join(format!("{device_id}.gpx"))
    }

    pub fn coverage_file_path(&self) -> PathBuf {
        self.gpx_directory.join("coverage_map.gpx")
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub gpxtracker: TrackerConfig,
}

/// The relay host's configuration file. Only the section this plugin reads
/// is modelled, everything else is ignored.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub plugins: PluginsConfig,
}

impl HostConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // an empty document deserializes to `()`, not to a mapping
        if yaml.trim().is_empty() {
            return Ok(HostConfig::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}
