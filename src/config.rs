//! Bridge configuration (`config.yaml`)

use std::fs;
use std::path::{Path, PathBuf};

use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};

use crate::raster::DEFAULT_MAX_DIMENSION;

const CONFIG_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdf-render";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config file {path:?}: {detail}")]
    Invalid { path: PathBuf, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Render buffers up to this many bytes are returned inline.
    /// Larger ones are parked in the buffer table.
    pub inline_buffer_limit: usize,
    /// Largest accepted surface side in pixels
    pub max_dimension: u32,
    /// Directory the `asset` method resolves names against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<PathBuf>,
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            inline_buffer_limit: 0,
            max_dimension: DEFAULT_MAX_DIMENSION,
            asset_dir: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/pdf-render/config.yaml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config| config.join(APP_NAME).join(CONFIG_FILENAME))
    }

    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    debug!("Could not determine config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!("Config file {path:?} not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|detail| ConfigError::Invalid {
            path: path.to_path_buf(),
            detail,
        })?;
        info!("Loaded config from {path:?}");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document deserialises to unit, not to a map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_dimension == 0 {
            return Err("max_dimension must be positive".to_string());
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(format!("unknown log_level '{}'", self.log_level));
        }
        Ok(())
    }

    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
