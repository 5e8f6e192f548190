use crate::constants::{CONFIG_DIR_NAME, DEFAULT_ENCODER};
use crate::encoder::CodecSettings;
use crate::formats::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub encoder_path: String,
    #[serde(flatten)]
    pub codecs: CodecSettings,
    pub default_format: OutputFormat,
    pub last_input_dir: Option<PathBuf>,
    pub last_output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            encoder_path: DEFAULT_ENCODER.to_string(),
            codecs: CodecSettings::default(),
            default_format: OutputFormat::default(),
            last_input_dir: None,
            last_output_dir: None,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.json"))
    }

    /// Loads the user's config, falling back to defaults on any problem.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::info!("Config file doesn't exist, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!("Config loaded from: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load config file, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) {
        let result = Self::config_path()
            .ok_or(ConfigError::NoConfigDir)
            .and_then(|path| self.save_to(&path).map(|_| path));

        match result {
            Ok(path) => tracing::debug!("Config saved to: {:?}", path),
            Err(e) => tracing::warn!("Failed to save config: {}", e),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn update_last_input_dir(&mut self, file_path: &Path) {
        self.last_input_dir = file_path.parent().map(Path::to_path_buf);
    }

    pub fn update_last_output_dir(&mut self, file_path: &Path) {
        self.last_output_dir = file_path.parent().map(Path::to_path_buf);
    }
}
