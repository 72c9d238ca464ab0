
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_MODEL: &str =
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const DEFAULT_INFERENCE_ENDPOINT: &str = "https://api-inference.huggingface.co";

const SUPABASE_KEY_ENV: &str = "SUPABASE_SERVICE_ROLE_KEY";
const HUGGINGFACE_KEY_ENV: &str = "HUGGINGFACE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupabaseConfig {
    pub url: String,
    /// Service-role key. Overridden by `SUPABASE_SERVICE_ROLE_KEY` when set.
    pub service_role_key: String,
    pub timeout_seconds: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_role_key: String::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    /// Inference API key. Overridden by `HUGGINGFACE_API_KEY` when set.
    pub api_key: String,
    pub batch_size: u32,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_INFERENCE_ENDPOINT.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: String::new(),
            batch_size: 16,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Supabase project URL is not set")]
    MissingSupabaseUrl,
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid top-k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Get the default configuration directory for the application
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("iskobot"))
        .ok_or(ConfigError::DirectoryError)
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(config_dir.as_ref()).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.as_ref().display()
            )
        })?;

        let config_path = config_dir.as_ref().join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Fill API keys from the environment, taking precedence over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(SUPABASE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.supabase.service_role_key = key;
            }
        }
        if let Ok(key) = std::env::var(HUGGINGFACE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.embeddings.api_key = key;
            }
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supabase.validate()?;
        self.embeddings.validate()?;

        if !(1..=50).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        Ok(())
    }
}

impl SupabaseConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingSupabaseUrl);
        }

        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))?;

        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn rest_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.endpoint).map_err(|_| ConfigError::InvalidUrl(self.endpoint.clone()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint).map_err(|_| ConfigError::InvalidUrl(self.endpoint.clone()))
    }
}
