//! Application configuration
//!
//! One TOML file under the user's config directory. A missing file is created with
//! defaults on first start; missing keys fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::controller::{PlayMode, PlaySettings, SamplerSettings};
use crate::sync::SyncConfig;

const CONFIG_DIR: &str = "iidx-monitor";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    pub sync: SyncConfig,
    pub play: PlayConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SamplerConfig {
    pub tick_period_ms: u32,
    pub detection_interval_ms: u64,
    pub scratch_axis_index: usize,
    pub auto_detect: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 5,
            detection_interval_ms: 100,
            scratch_axis_index: 1,
            auto_detect: true,
        }
    }
}

impl SamplerConfig {
    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            tick_period_ms: self.tick_period_ms.max(1),
            scratch_axis_index: self.scratch_axis_index,
        }
    }
}

/// Initial play settings; runtime changes are not written back
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PlayConfig {
    pub mode: PlayMode,
    pub sp_device: Option<usize>,
    pub p1_device: Option<usize>,
    pub p2_device: Option<usize>,
}

impl PlayConfig {
    pub fn play_settings(&self) -> PlaySettings {
        PlaySettings {
            mode: self.mode,
            sp_device: self.sp_device,
            dp_devices: [self.p1_device, self.p2_device],
        }
    }
}

/// `<config dir>/iidx-monitor/config.toml`, relative to the working directory if the
/// platform has no config dir.
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

impl AppConfig {
    /// Loads the config at `path`, writing a default file first if there is none.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io_error = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if !tokio::fs::try_exists(path).await.map_err(io_error)? {
            info!("No config at {}, writing defaults", path.display());
            let config = AppConfig::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await.map_err(io_error)?;
        let config = Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
            }
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        tokio::fs::write(path, content).await.map_err(io_error)?;
        info!("Config written to {}", path.display());
        Ok(())
    }
}
