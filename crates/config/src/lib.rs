//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `parley.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Retrieval / grounding configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Turn orchestration configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Generation backend configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which adapter backs the session store: "sqlite" or "in_memory".
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path (or "sqlite::memory:" for ephemeral).
    #[serde(default = "default_db_path")]
    pub database_path: String,

    /// Maximum connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Inactive sessions older than this many days are purged by `delete_old_sessions`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_db_path() -> String {
    "sqlite://parley.db".into()
}
fn default_max_connections() -> u32 {
    8
}
fn default_retention_days() -> u32 {
    90
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            database_path: default_db_path(),
            max_connections: default_max_connections(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks requested per query per knowledge base.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Drop scored chunks below this threshold; unscored chunks always pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,

    /// Whether prior human turns contribute extra search queries.
    #[serde(default = "default_true")]
    pub include_history_queries: bool,

    /// Maximum history-derived queries per turn.
    #[serde(default = "default_max_history_queries")]
    pub max_history_queries: usize,

    /// Maximum character length of the assembled context string.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
}

fn default_top_k() -> usize {
    4
}
fn default_max_history_queries() -> usize {
    2
}
fn default_max_context_length() -> usize {
    4000
}
fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: None,
            include_history_queries: true,
            max_history_queries: default_max_history_queries(),
            max_context_length: default_max_context_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Messages of history loaded per turn.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Characters of the first user message used as the session title.
    #[serde(default = "default_title_len")]
    pub title_len: usize,

    /// Event channel capacity per streaming turn.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_history_limit() -> u32 {
    20
}
fn default_title_len() -> usize {
    50
}
fn default_channel_capacity() -> usize {
    128
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            title_len: default_title_len(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key (usually supplied via PARLEY_API_KEY).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("store", &self.store)
            .field("retrieval", &self.retrieval)
            .field("engine", &self.engine)
            .field("generation", &self.generation)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8200
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (./parley.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `PARLEY_API_KEY`    — generation API key
    /// - `PARLEY_MODEL`      — generation model
    /// - `PARLEY_DATABASE`   — store database path
    /// - `PARLEY_PORT`       — gateway port
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = PathBuf::from("parley.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.generation.api_key.is_none() {
            config.generation.api_key = std::env::var("PARLEY_API_KEY").ok();
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            config.generation.model = model;
        }

        if let Ok(db) = std::env::var("PARLEY_DATABASE") {
            config.store.database_path = db;
        }

        if let Ok(port) = std::env::var("PARLEY_PORT") {
            config.gateway.port = port
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("invalid PARLEY_PORT: {port}")))?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if let Some(threshold) = self.retrieval.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::ValidationError(
                    "retrieval.score_threshold must be between 0.0 and 1.0".into(),
                ));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }

        if self.engine.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "engine.history_limit must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            engine: EngineConfig::default(),
            generation: GenerationConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
