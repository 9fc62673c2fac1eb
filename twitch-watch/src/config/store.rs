//! Configuration persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::types::WatchConfig;
use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = "twitch-watch";
const CONFIG_FILE_NAME: &str = "config.json";

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<WatchConfig>;

    async fn save(&self, config: &WatchConfig) -> Result<()>;
}

/// JSON file on disk.
///
/// A missing or unreadable file loads defaults; writes go through a temp
/// file and a rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/twitch-watch/config.json`.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::config("could not determine the user config directory"))?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<WatchConfig> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file yet, using defaults");
                return Ok(WatchConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Config file is corrupt, falling back to defaults"
                );
                Ok(WatchConfig::default())
            }
        }
    }

    async fn save(&self, config: &WatchConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&config.persisted())?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }
}

/// In-memory store. Applies the same secret filtering as the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Mutex<Option<WatchConfig>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WatchConfig) -> Self {
        Self {
            config: Mutex::new(Some(config)),
            saves: Mutex::new(0),
        }
    }

    /// Last saved config, if any.
    pub fn saved(&self) -> Option<WatchConfig> {
        self.config.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<WatchConfig> {
        Ok(self.config.lock().clone().unwrap_or_default())
    }

    async fn save(&self, config: &WatchConfig) -> Result<()> {
        *self.config.lock() = Some(config.persisted());
        *self.saves.lock() += 1;
        Ok(())
    }
}
