// Optional YAML configuration for the CLI

use crate::display::{DEFAULT_DATE_FORMAT, is_valid_date_format};
use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "todostore";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database; platform data dir when unset
    pub store_path: Option<PathBuf>,
    /// chrono format for the updated-at column
    pub date_format: String,
    /// Fallback tracing filter when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))?;

        if !is_valid_date_format(&config.date_format) {
            bail!("Invalid date_format {:?} in config {}", config.date_format, path.display());
        }
        Ok(config)
    }

    /// Directory the store lives in, after applying defaults
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".todostore"))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}
