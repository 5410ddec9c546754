use annotext_engine::{DisplayMode, StabilizerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Display mode per annotation kind. Kinds not listed here render as
    /// `invisible`.
    #[serde(default)]
    pub display_modes: BTreeMap<String, DisplayMode>,

    /// Anchor line as a percentage of viewport height, 0..=100.
    #[serde(default = "default_stable_fraction")]
    pub stable_fraction: u8,

    /// Scroll convergence aggressiveness, 0..=10.
    #[serde(default = "default_stabilization_level")]
    pub stabilization_level: u8,
}

fn default_stable_fraction() -> u8 {
    StabilizerConfig::default().stable_fraction
}

fn default_stabilization_level() -> u8 {
    StabilizerConfig::default().stabilization_level
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_modes: BTreeMap::new(),
            stable_fraction: default_stable_fraction(),
            stabilization_level: default_stabilization_level(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/annotext");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    /// Stabilizer settings with out-of-range values clamped.
    pub fn stabilizer(&self) -> StabilizerConfig {
        StabilizerConfig {
            stable_fraction: self.stable_fraction,
            stabilization_level: self.stabilization_level,
        }
        .clamped()
    }

    pub fn mode_for(&self, kind: &str) -> DisplayMode {
        self.display_modes.get(kind).copied().unwrap_or_default()
    }
}
