use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ConfigRecord;

/// Environment variable pointing at the settings file
pub const CONFIG_PATH_ENV: &str = "CHAMBERS_DB_CONFIG";

fn default_connection_name() -> String {
    "default".to_string()
}

/// Named connection records plus the name used when none is requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_connection_name")]
    default: String,
    #[serde(default)]
    connections: BTreeMap<String, ConfigRecord>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(default_connection_name())
    }
}

impl DatabaseSettings {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            connections: BTreeMap::new(),
        }
    }

    /// Loads settings from `path`, or from `CHAMBERS_DB_CONFIG`, or from the
    /// per-user config directory
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => PathBuf::from(path),
                None => Self::default_path()?,
            },
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading database settings from {}", path.display()))?;
        let settings = Self::from_json(&raw)
            .with_context(|| format!("parsing database settings in {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            connections = settings.connections.len(),
            "loaded database settings"
        );
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join("chambers").join("database.json"))
    }

    /// Writes settings as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing database settings to {}", path.display()))?;
        Ok(())
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default = name.into();
    }

    pub fn connection(&self, name: &str) -> Option<&ConfigRecord> {
        self.connections.get(name)
    }

    /// Adds or replaces a named connection
    pub fn insert(&mut self, name: impl Into<String>, config: ConfigRecord) -> Option<ConfigRecord> {
        self.connections.insert(name.into(), config)
    }

    pub fn remove(&mut self, name: &str) -> Option<ConfigRecord> {
        self.connections.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }
}
