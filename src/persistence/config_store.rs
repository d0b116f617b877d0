use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::AppConfig;

const APP_DIR: &str = "bongocat-overlay";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at `<config dir>/bongocat-overlay/config.toml`
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().ok_or_else(|| eyre!("No config directory on this platform"))?;
        Ok(Self::at(base.join(APP_DIR).join(CONFIG_FILE)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the config, falling back to defaults when it is missing or unreadable
    pub async fn load(&self) -> AppConfig {
        match self.try_load().await {
            Ok(Some(config)) => {
                info!("Loaded config from {}", self.path.display());
                config
            }
            Ok(None) => {
                info!("No config at {}, using defaults", self.path.display());
                AppConfig::default()
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                AppConfig::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<AppConfig>> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| eyre!("Failed to read config file: {}", e))?;
        let config =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        Ok(Some(config))
    }

    pub async fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;

        debug!("Config saved to {}", self.path.display());
        Ok(())
    }
}
