// ⚙️ Configuration - detector thresholds and store locations
//
// Loaded from TOML. Every field has a default, so a partial file (or no
// file at all) is fine. CLI flags are applied on top by the binary.
//
// ```toml
// [detector]
// z_threshold = 2.5
// structuring_window_minutes = 45
// structuring_amount_threshold = 200.0
//
// [store]
// database = "data/records.db"
// ```

use crate::anomaly::DetectorConfig;
use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "analytics.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database: PathBuf,

    /// When set, records are read from this CSV instead of the database
    pub csv: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database: PathBuf::from("data/records.db"),
            csv: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub detector: DetectorConfig,
    pub store: StoreConfig,
}

impl AnalyticsConfig {
    /// Load from `path`, or `analytics.toml` in the working directory.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&contents)?;
            debug!(path = %config_path.display(), "loaded configuration");
            Ok(config)
        } else if path.is_some() {
            Err(AnalyticsError::Config(format!(
                "config file not found: {}",
                config_path.display()
            )))
        } else {
            Ok(AnalyticsConfig::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| AnalyticsError::Config(e.to_string()))
    }
}
