//! Configuration management for Watch Pro
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, WatchProError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Watch Pro
///
/// This structure holds all configuration needed by the service,
/// including provider settings, upstream search credentials, the
/// key-value store backend, and workflow limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model provider configuration (OpenAI-compatible, Ollama)
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Upstream search and extraction API configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Key-value store backend configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Search cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Orchestration workflow configuration
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Provider configuration
///
/// Specifies which model provider to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// OpenAI-compatible provider configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_provider_type() -> String {
    "openai".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// OpenAI-compatible chat completions configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (everything before `/chat/completions`)
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_openai_model")]
    pub model: String,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_openai_api_base(),
            model: default_openai_model(),
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Upstream search and content-extraction API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// API key included in every request body
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL; `/search` and `/extract` are appended
    #[serde(default = "default_search_api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,

    /// Maximum characters of extracted page content handed to the model
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_search_api_base() -> String {
    "https://api.tavily.com".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

fn default_max_content_chars() -> usize {
    10_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_search_api_base(),
            timeout_seconds: default_search_timeout(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

/// Which key-value store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Hosted REST key-value service
    Hosted,
    /// Self-hosted embedded store on local disk
    #[default]
    Local,
}

/// Key-value store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selected once at startup
    #[serde(default)]
    pub backend: StoreBackend,

    /// Hosted REST service endpoint
    #[serde(default)]
    pub rest_url: Option<String>,

    /// Hosted REST service bearer token
    #[serde(default)]
    pub rest_token: Option<String>,

    /// Directory of the local embedded store
    #[serde(default = "default_store_path")]
    pub local_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/watchpro.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            rest_url: None,
            rest_token: None,
            local_path: default_store_path(),
        }
    }
}

/// Search cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expiry applied to cached search responses (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,

    /// Run the periodic cleanup sweep over `search:*` keys
    #[serde(default)]
    pub sweep_enabled: bool,

    /// Interval between sweeps (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            sweep_enabled: false,
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

/// Orchestration workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum model steps the researcher may take (each step may call tools)
    #[serde(default = "default_max_research_steps")]
    pub max_research_steps: usize,

    /// Number of most recent messages sent to the model
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// User id recorded on chats when the caller does not supply one
    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    /// Capacity of the per-request workflow event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_research_steps() -> usize {
    5
}

fn default_max_history_messages() -> usize {
    10
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_event_buffer() -> usize {
    64
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_research_steps: default_max_research_steps(),
            max_history_messages: default_max_history_messages(),
            default_user_id: default_user_id(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(WatchProError::from)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config = serde_yaml::from_str(&contents)
            .map_err(WatchProError::from)
            .context("Failed to parse config")?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        // Provider overrides
        if let Ok(provider_type) = std::env::var("WATCHPRO_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.provider.openai.api_key = Some(api_key);
        }

        if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
            self.provider.openai.api_base = api_base;
        }

        if let Ok(model) = std::env::var("OPENAI_API_MODEL") {
            self.provider.openai.model = model;
        }

        if let Ok(ollama_host) = std::env::var("WATCHPRO_OLLAMA_HOST") {
            self.provider.ollama.host = ollama_host;
        }

        if let Ok(ollama_model) = std::env::var("WATCHPRO_OLLAMA_MODEL") {
            self.provider.ollama.model = ollama_model;
        }

        // Search API overrides
        if let Ok(api_key) = std::env::var("TAVILY_API_KEY") {
            self.search.api_key = Some(api_key);
        }

        if let Ok(api_base) = std::env::var("WATCHPRO_SEARCH_API_BASE") {
            self.search.api_base = api_base;
        }

        // Store overrides
        if let Ok(backend) = std::env::var("WATCHPRO_STORE_BACKEND") {
            self.store.backend = match backend.to_lowercase().as_str() {
                "hosted" | "rest" => StoreBackend::Hosted,
                "local" => StoreBackend::Local,
                _ => {
                    tracing::warn!("Invalid store backend: {}, using default", backend);
                    StoreBackend::default()
                }
            };
        }

        if let Ok(url) = std::env::var("UPSTASH_REDIS_REST_URL") {
            self.store.rest_url = Some(url);
        }

        if let Ok(token) = std::env::var("UPSTASH_REDIS_REST_TOKEN") {
            self.store.rest_token = Some(token);
        }

        if let Ok(path) = std::env::var("WATCHPRO_STORE_PATH") {
            self.store.local_path = PathBuf::from(path);
        }

        // Cache overrides
        if let Ok(enabled) = std::env::var("WATCHPRO_CACHE_SWEEP") {
            match enabled.parse::<bool>() {
                Ok(v) => {
                    self.cache.sweep_enabled = v;
                    tracing::debug!(sweep_enabled = v, "Env override: WATCHPRO_CACHE_SWEEP");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for WATCHPRO_CACHE_SWEEP: {}", enabled);
                }
            }
        }

        // Workflow overrides
        if let Ok(steps) = std::env::var("WATCHPRO_MAX_RESEARCH_STEPS") {
            if let Ok(value) = steps.parse() {
                self.workflow.max_research_steps = value;
            } else {
                tracing::warn!("Invalid WATCHPRO_MAX_RESEARCH_STEPS: {}", steps);
            }
        }

        if let Ok(bind) = std::env::var("WATCHPRO_BIND") {
            self.server.bind = bind;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.store_path {
            self.store.backend = StoreBackend::Local;
            self.store.local_path = PathBuf::from(path);
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set. Credentials are checked
    /// where they are consumed, so commands that never reach a provider or
    /// the search API can run without them.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(WatchProError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.workflow.max_research_steps == 0 {
            return Err(WatchProError::Config(
                "workflow.max_research_steps must be greater than 0".to_string(),
            )
            .into());
        }

        if self.workflow.max_history_messages == 0 {
            return Err(WatchProError::Config(
                "workflow.max_history_messages must be greater than 0".to_string(),
            )
            .into());
        }

        if self.workflow.event_buffer == 0 {
            return Err(WatchProError::Config(
                "workflow.event_buffer must be greater than 0".to_string(),
            )
            .into());
        }

        if self.search.max_content_chars == 0 {
            return Err(WatchProError::Config(
                "search.max_content_chars must be greater than 0".to_string(),
            )
            .into());
        }

        if self.cache.ttl_seconds == 0 {
            return Err(
                WatchProError::Config("cache.ttl_seconds must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.cache.sweep_enabled && self.cache.sweep_interval_seconds == 0 {
            return Err(WatchProError::Config(
                "cache.sweep_interval_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.store.backend == StoreBackend::Hosted && self.store.rest_url.is_none() {
            return Err(WatchProError::Config(
                "store.rest_url is required for the hosted backend".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
