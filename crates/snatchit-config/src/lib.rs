//! Backend configuration for the SnatchIt membership core, stored as JSON in
//! `~/.snatchit/config.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_channel_capacity() -> usize {
    100
}

/// Which document store backs the membership core.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-process store; state is lost on restart.
    Memory,
    /// SQLite file; `database_url` overrides the default location.
    #[default]
    Sqlite,
}

/// Main backend configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub store: StoreKind,
    /// `sqlite://path/to/store.db`; None means `~/.snatchit/store.db`.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Broadcast buffer per gang channel before slow subscribers lag out.
    #[serde(default = "default_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            database_url: None,
            event_channel_capacity: default_channel_capacity(),
        }
    }
}

impl BackendConfig {
    /// Load config from default path (~/.snatchit/config.json)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Read(e)
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to custom path
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    /// Get default config path (~/.snatchit/config.json)
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".snatchit")
            .join("config.json")
    }
}
