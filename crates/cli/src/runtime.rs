//! Wiring from [`AppConfig`] to live components.

use cadlens_config::{AppConfig, ConfigError, KnowledgeConfig};
use cadlens_context::{ContextBuilder, ContextSettings};
use cadlens_core::{Embedder, EventBus, Payload, VectorStore};
use cadlens_knowledge::KnowledgeStore;
use cadlens_memory::{
    FileVectorStore, HashingEmbedder, HttpEmbedder, InMemoryVectorStore, SqliteVectorStore,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

type BoxError = Box<dyn std::error::Error>;

pub fn load_config() -> Result<AppConfig, BoxError> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

pub fn embedder(config: &KnowledgeConfig) -> Result<Arc<dyn Embedder>, ConfigError> {
    match config.embedding_provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.embedding_dimensions))),
        "openai" => {
            let api_key = config.embedding_api_key.clone().ok_or_else(|| {
                ConfigError::ValidationError("openai embeddings need an API key".into())
            })?;
            Ok(Arc::new(HttpEmbedder::new(
                &config.embedding_api_url,
                api_key,
                &config.embedding_model,
                config.embedding_dimensions,
            )))
        }
        other => Err(ConfigError::ValidationError(format!(
            "Unknown embedding provider: {other}"
        ))),
    }
}

/// Open the configured vector store.
pub async fn vector_store(config: &KnowledgeConfig) -> Result<Arc<dyn VectorStore>, BoxError> {
    let embedder = embedder(config)?;
    let path = config.resolved_path();
    debug!(backend = %config.backend, path = %path.display(), "Opening knowledge backend");

    let store: Arc<dyn VectorStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryVectorStore::new(embedder)),
        "file" => Arc::new(FileVectorStore::new(path, embedder)),
        "sqlite" => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteVectorStore::new(&path.to_string_lossy(), embedder).await?)
        }
        other => return Err(format!("Unknown knowledge backend: {other}").into()),
    };
    Ok(store)
}

pub async fn knowledge_store(config: &AppConfig) -> Result<Arc<KnowledgeStore>, BoxError> {
    Ok(Arc::new(KnowledgeStore::new(
        vector_store(&config.knowledge).await?,
    )))
}

pub fn event_bus(config: &AppConfig) -> EventBus {
    EventBus::with_poll_interval(config.events.history_capacity, config.events.poll_interval())
}

pub fn context_settings(config: &AppConfig) -> ContextSettings {
    let context = &config.context;
    ContextSettings {
        cache_ttl: context.cache_ttl(),
        similar_operations: context.similar_operations,
        design_patterns: context.design_patterns,
        error_solutions: context.error_solutions,
        recent_events: context.recent_events,
    }
}

pub fn context_builder(
    config: &AppConfig,
    knowledge: Arc<KnowledgeStore>,
    events: Option<EventBus>,
) -> ContextBuilder {
    ContextBuilder::new(knowledge, events, context_settings(config))
}

/// Parse a command-line JSON argument that must be an object.
pub fn parse_object(raw: &str, what: &str) -> Result<Payload, BoxError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("{what} must be a JSON object").into()),
        Err(e) => Err(format!("Invalid {what} JSON: {e}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object(r#"{"file_path": "a.part"}"#, "args").is_ok());
        assert!(parse_object("[1, 2]", "args").is_err());
        assert!(parse_object("{", "args").is_err());
    }

    #[test]
    fn openai_without_key_is_rejected() {
        let config = KnowledgeConfig {
            embedding_provider: "openai".into(),
            ..Default::default()
        };
        assert!(embedder(&config).is_err());
        assert!(embedder(&KnowledgeConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn file_backend_opens_under_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.knowledge.path = Some(dir.path().join("kb"));
        let store = knowledge_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "file");
        assert_eq!(store.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn sqlite_backend_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.knowledge.backend = "sqlite".into();
        config.knowledge.path = Some(dir.path().join("nested").join("kb.db"));
        let store = knowledge_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(dir.path().join("nested").exists());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.context.recent_events = 8;
        config.context.cache_ttl_secs = 60;
        let settings = context_settings(&config);
        assert_eq!(settings.recent_events, 8);
        assert_eq!(settings.cache_ttl.as_secs(), 60);
    }
}
