//! Configuration loading, validation, and management for CadLens.
//!
//! Loads configuration from `~/.cadlens/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Vector store backends understood by the CLI.
pub const KNOWLEDGE_BACKENDS: [&str; 3] = ["memory", "file", "sqlite"];

/// Embedding providers understood by the CLI.
pub const EMBEDDING_PROVIDERS: [&str; 2] = ["hashing", "openai"];

/// The root configuration structure.
///
/// Maps directly to `~/.cadlens/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Event bus settings
    #[serde(default)]
    pub events: EventsConfig,

    /// Knowledge store and embedding settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Context builder settings
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Maximum number of events retained in history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// How long the idle dispatcher waits before re-checking for shutdown
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_history_capacity() -> usize {
    1000
}
fn default_poll_interval_ms() -> u64 {
    1000
}

impl EventsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// `memory`, `file` or `sqlite`
    #[serde(default = "default_knowledge_backend")]
    pub backend: String,

    /// Storage location; defaults under the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// `hashing` (offline, deterministic) or `openai`
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    #[serde(default = "default_embedding_api_url")]
    pub embedding_api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_api_key: Option<String>,
}

fn default_knowledge_backend() -> String {
    "file".into()
}
fn default_embedding_provider() -> String {
    "hashing".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimensions() -> usize {
    256
}
fn default_embedding_api_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for KnowledgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("embedding_provider", &self.embedding_provider)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("embedding_api_url", &self.embedding_api_url)
            .field("embedding_api_key", &redact(&self.embedding_api_key))
            .finish()
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: default_knowledge_backend(),
            path: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            embedding_api_url: default_embedding_api_url(),
            embedding_api_key: None,
        }
    }
}

impl KnowledgeConfig {
    /// Where the configured backend keeps its data.
    ///
    /// `file` uses a directory, `sqlite` a database file. `memory` has no
    /// location but still reports the default directory.
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend.as_str()) {
            (Some(path), _) => path.clone(),
            (None, "sqlite") => AppConfig::config_dir().join("knowledge.db"),
            (None, _) => AppConfig::config_dir().join("knowledge"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// How long a built context document is served from cache
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_three")]
    pub similar_operations: usize,

    #[serde(default = "default_three")]
    pub design_patterns: usize,

    #[serde(default = "default_three")]
    pub error_solutions: usize,

    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
}

fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_three() -> usize {
    3
}
fn default_recent_events() -> usize {
    5
}

impl ContextConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            similar_operations: default_three(),
            design_patterns: default_three(),
            error_solutions: default_three(),
            recent_events: default_recent_events(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.cadlens/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CADLENS_KNOWLEDGE_BACKEND`
    /// - `CADLENS_EMBEDDING_PROVIDER`
    /// - `CADLENS_EMBEDDING_API_KEY` (falls back to `OPENAI_API_KEY`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
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

    /// Apply overrides from a variable lookup (the process environment in
    /// [`AppConfig::load`]).
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = var("CADLENS_KNOWLEDGE_BACKEND") {
            self.knowledge.backend = backend;
        }
        if let Some(provider) = var("CADLENS_EMBEDDING_PROVIDER") {
            self.knowledge.embedding_provider = provider;
        }
        if let Some(key) = var("CADLENS_EMBEDDING_API_KEY").or_else(|| {
            self.knowledge
                .embedding_api_key
                .is_none()
                .then(|| var("OPENAI_API_KEY"))
                .flatten()
        }) {
            self.knowledge.embedding_api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cadlens")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "events.history_capacity must be > 0".into(),
            ));
        }
        if self.events.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "events.poll_interval_ms must be > 0".into(),
            ));
        }
        if !KNOWLEDGE_BACKENDS.contains(&self.knowledge.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown knowledge.backend '{}' (expected one of {})",
                self.knowledge.backend,
                KNOWLEDGE_BACKENDS.join(", ")
            )));
        }
        if !EMBEDDING_PROVIDERS.contains(&self.knowledge.embedding_provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown knowledge.embedding_provider '{}' (expected one of {})",
                self.knowledge.embedding_provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if self.knowledge.embedding_dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.embedding_dimensions must be > 0".into(),
            ));
        }
        if self.knowledge.embedding_provider == "openai" && self.knowledge.embedding_api_key.is_none()
        {
            return Err(ConfigError::ValidationError(
                "knowledge.embedding_provider 'openai' requires embedding_api_key".into(),
            ));
        }
        if self.context.cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "context.cache_ttl_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
