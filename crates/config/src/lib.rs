//! Configuration loading, validation, and management for Sleuth.
//!
//! Loads configuration from `~/.sleuth/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sleuth/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Knowledge lookup tool
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Database query tool
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Answer faithfulness scoring (`POST /eval`)
    #[serde(default)]
    pub eval: EvalConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "groq".into()
}
fn default_model() -> String {
    "meta-llama/llama-4-maverick-17b-128e-instruct".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("knowledge", &self.knowledge)
            .field("database", &self.database)
            .field("eval", &self.eval)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Prior history entries kept per session
    #[serde(default = "default_history_max")]
    pub history_max: usize,

    /// Overall per-session timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Tool dispatch rounds allowed per session
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Run the tool calls of one round concurrently
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,

    /// Replaces the built-in system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_history_max() -> usize {
    20
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_max_rounds() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_max: default_history_max(),
            timeout_secs: default_timeout_secs(),
            max_rounds: default_max_rounds(),
            parallel_tool_calls: true,
            system_prompt: None,
        }
    }
}

/// Where the knowledge lookup tool finds its passages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBackend {
    /// Qdrant collection searched by embedding similarity
    Qdrant,
    /// Documents loaded from a local JSON file, keyword scored
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_knowledge_backend")]
    pub backend: KnowledgeBackend,

    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Provider used for embeddings (defaults to `default_provider`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// JSON array of `{content, metadata}` records for the local backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_file: Option<PathBuf>,
}

fn default_knowledge_backend() -> KnowledgeBackend {
    KnowledgeBackend::Qdrant
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".into()
}
fn default_collection() -> String {
    "my_documents".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_top_k() -> usize {
    5
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_knowledge_backend(),
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
            embedding_model: default_embedding_model(),
            embedding_provider: None,
            top_k: default_top_k(),
            documents_file: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `postgres://...` or `sqlite://...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Rows rendered into the tool answer
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Provider used for SQL generation (defaults to `default_provider`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coder_provider: Option<String>,

    /// Model used for SQL generation (defaults to `default_model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coder_model: Option<String>,

    /// Inline schema DDL shown to the SQL generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// File holding the schema DDL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
}

fn default_max_connections() -> u32 {
    4
}
fn default_max_rows() -> usize {
    100
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            max_connections: default_max_connections(),
            max_rows: default_max_rows(),
            coder_provider: None,
            coder_model: None,
            schema: None,
            schema_file: None,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Connection URLs usually embed credentials
        f.debug_struct("DatabaseConfig")
            .field("enabled", &self.enabled)
            .field("url", &redact(&self.url))
            .field("max_connections", &self.max_connections)
            .field("max_rows", &self.max_rows)
            .field("coder_provider", &self.coder_provider)
            .field("coder_model", &self.coder_model)
            .field("schema", &self.schema.as_ref().map(|s| s.len()))
            .field("schema_file", &self.schema_file)
            .finish()
    }
}

impl DatabaseConfig {
    /// Resolve the schema text: inline DDL wins over `schema_file`.
    pub fn load_schema(&self) -> Result<Option<String>, ConfigError> {
        if let Some(schema) = &self.schema {
            return Ok(Some(schema.clone()));
        }
        match &self.schema_file {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|e| ConfigError::ReadError {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

/// The judge model that scores answers against their evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Judge provider (defaults to `default_provider`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Judge model (defaults to `default_model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: None,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// CORS origins; empty means same-origin only
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sleuth/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `SLEUTH_API_KEY`, `GROQ_API_KEY`, `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    ///   (first one set wins, only when no key is configured)
    /// - `SLEUTH_PROVIDER`, `SLEUTH_MODEL`
    /// - `SLEUTH_QDRANT_URL`, `DATABASE_URL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = ["SLEUTH_API_KEY", "GROQ_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
                .into_iter()
                .find_map(&var);
        }
        if let Some(provider) = var("SLEUTH_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = var("SLEUTH_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = var("SLEUTH_QDRANT_URL") {
            self.knowledge.qdrant_url = url;
        }
        if self.database.url.is_none() {
            self.database.url = var("DATABASE_URL");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sleuth")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.timeout_secs must be > 0".into(),
            ));
        }
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be > 0".into(),
            ));
        }
        if self.knowledge.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.top_k must be > 0".into(),
            ));
        }
        if self.knowledge.enabled
            && self.knowledge.backend == KnowledgeBackend::Local
            && self.knowledge.documents_file.is_none()
        {
            return Err(ConfigError::ValidationError(
                "knowledge.documents_file is required for the local backend".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            knowledge: KnowledgeConfig::default(),
            database: DatabaseConfig::default(),
            eval: EvalConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
