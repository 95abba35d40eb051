use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HubSpotError, Result};

/// Environment variable holding the HubSpot access token
pub const API_KEY_ENV: &str = "HUBSPOT_API_KEY";

/// Environment variable holding the summarizer credential
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub emails: EmailConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_override_domain")]
    pub override_domain: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            override_domain: default_override_domain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.hubapi.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_requests() -> usize {
    110
}

fn default_window_secs() -> u64 {
    10
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("companies_cache")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("email_contents")
}

fn default_override_domain() -> String {
    "bondo.es".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_input_chars() -> usize {
    4000
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HubSpotError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| HubSpotError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                HubSpotError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| HubSpotError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| HubSpotError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(HubSpotError::ConfigError(
                "api.base_url cannot be empty".to_string(),
            ));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(HubSpotError::ConfigError(
                "api.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        // The list endpoints reject limits above 100
        if self.api.page_size == 0 {
            return Err(HubSpotError::ConfigError(
                "api.page_size must be at least 1".to_string(),
            ));
        }
        if self.api.page_size > 100 {
            return Err(HubSpotError::ConfigError(
                "api.page_size cannot exceed 100 (the API caps list pages at 100)".to_string(),
            ));
        }

        if self.api.max_attempts == 0 {
            return Err(HubSpotError::ConfigError(
                "api.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(HubSpotError::ConfigError(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(HubSpotError::ConfigError(
                "rate_limit.window_secs must be at least 1".to_string(),
            ));
        }

        if self.summarizer.max_tokens == 0 {
            return Err(HubSpotError::ConfigError(
                "summarizer.max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.summarizer.temperature) {
            return Err(HubSpotError::ConfigError(
                "summarizer.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.summarizer.max_input_chars == 0 {
            return Err(HubSpotError::ConfigError(
                "summarizer.max_input_chars must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

/// Read the required API credential, failing fast when unset
pub fn api_token_from_env() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(HubSpotError::ConfigError(format!(
            "{} is not set; export a private app token before running",
            API_KEY_ENV
        ))),
    }
}

/// Read the optional summarizer credential
pub fn openai_key_from_env() -> Option<String> {
    std::env::var(OPENAI_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
