//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backlight level applied at startup (0-7)
    #[serde(default = "default_brightness")]
    pub brightness: u8,

    /// Edge length of the tiles images are sent in
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Slideshow interval in milliseconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Device identification
    #[serde(default)]
    pub device: DeviceConfig,
}

/// USB identifiers of the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_vid")]
    pub vid: u16,

    #[serde(default = "default_pid")]
    pub pid: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vid: default_vid(),
            pid: default_pid(),
        }
    }
}

// Default value functions
fn default_brightness() -> u8 {
    dpf_hw::lcd::MAX_BRIGHTNESS
}

fn default_tile_size() -> u32 {
    dpf_hw::lcd::DEFAULT_TILE_SIZE
}

fn default_interval() -> u64 {
    5000
}

fn default_vid() -> u16 {
    dpf_hw::DPF_VID
}

fn default_pid() -> u16 {
    dpf_hw::DPF_PID
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Loads `path` if given, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            tile_size: default_tile_size(),
            interval: default_interval(),
            device: DeviceConfig::default(),
        }
    }
}
