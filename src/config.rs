//! Configuration file handling.
//!
//! Settings come from `.health-watch.toml`, then environment variables and
//! command-line flags override them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = ".health-watch.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Postgres,
}

/// Where the report slot lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Directory holding `<slot>.json` for the file backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Name of the slot the report sequence is stored under.
    #[serde(default = "default_slot")]
    pub slot: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            data_dir: default_data_dir(),
            slot: default_slot(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".health-watch")
}

fn default_slot() -> String {
    "health_reports".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing level when neither `-v` nor `RUST_LOG` is given.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}

/// Values from the command line (and their env fallbacks) that override the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub slot: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Returns `Ok(None)` if the default file doesn't exist, `Err` if it can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    /// Apply overrides. A database URL from the command line or environment
    /// switches the backend to postgres.
    pub fn merge(&mut self, overrides: Overrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(slot) = overrides.slot {
            self.storage.slot = slot;
        }
        if let Some(url) = overrides.database_url {
            self.storage.database_url = Some(url);
            self.storage.backend = Backend::Postgres;
        }
    }

    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}
