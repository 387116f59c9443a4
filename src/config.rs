use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub groq: ProviderConfig,
    pub gemini: ProviderConfig,
    pub default_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sitesmith")
            .join("config.yaml")
    }

    /// Load the config file if present, otherwise fall back to defaults
    /// with API keys taken from the environment.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            if let Ok(config) = Self::load_from_file(&config_path) {
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(Self::config_path())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groq: ProviderConfig {
                api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
                api_url: api::GROQ_DEFAULT_URL.to_string(),
                model: api::GROQ_DEFAULT_MODEL.to_string(),
            },
            gemini: ProviderConfig {
                api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
                api_url: api::GEMINI_DEFAULT_URL.to_string(),
                model: api::GEMINI_DEFAULT_MODEL.to_string(),
            },
            default_model: "groq".to_string(),
        }
    }
}
