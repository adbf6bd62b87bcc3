//! Vector store and embedding traits: semantic storage behind the knowledge store.
//!
//! The knowledge store never talks to a concrete index. It hands text and
//! metadata to a [`VectorStore`], which embeds it through an [`Embedder`]
//! and answers nearest-neighbour queries with a stable ranking.

use crate::canonical::Payload;
use crate::error::MemoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The four knowledge collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// What was done and how it turned out.
    Operations,
    /// Reusable design patterns and best practices.
    Patterns,
    /// Errors and their known solutions.
    Errors,
    /// Macro snippets and their use cases.
    Macros,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Operations,
        Collection::Patterns,
        Collection::Errors,
        Collection::Macros,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::Patterns => "patterns",
            Self::Errors => "errors",
            Self::Macros => "macros",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A document as persisted by a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,

    /// The searchable text the embedding was computed from.
    pub text: String,

    #[serde(default)]
    pub metadata: Payload,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,

    /// When this version of the document was written.
    pub stored_at: DateTime<Utc>,
}

/// A query hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: Payload,
    /// Similarity to the query (higher is closer).
    pub score: f32,
    pub stored_at: DateTime<Utc>,
}

/// Attribute filter: every listed field must equal the given value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &Payload) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| metadata.get(field) == Some(expected))
    }
}

/// Text → fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name (e.g., "hashing", "openai").
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, MemoryError>;
}

/// The vector store contract.
///
/// A document is visible to every query issued after its `add_document`
/// call returned. Adding a document with an existing ID replaces it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Embed `text` and upsert the document under `id`.
    async fn add_document(
        &self,
        collection: Collection,
        text: &str,
        metadata: Payload,
        id: &str,
    ) -> std::result::Result<(), MemoryError>;

    /// Up to `limit` documents ranked by descending similarity to `text`.
    ///
    /// Ties are broken by most recent `stored_at`, then by ID.
    async fn query(
        &self,
        collection: Collection,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<ScoredDocument>, MemoryError>;

    /// Every document in the collection, in storage order.
    async fn get_all(
        &self,
        collection: Collection,
    ) -> std::result::Result<Vec<StoredDocument>, MemoryError>;

    async fn count(&self, collection: Collection) -> std::result::Result<usize, MemoryError>;

    async fn clear(&self, collection: Collection) -> std::result::Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_requires_every_field() {
        let meta = json!({"success": true, "operation": "open_model"})
            .as_object()
            .cloned()
            .unwrap();

        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::new().eq("success", true).matches(&meta));
        assert!(
            !MetadataFilter::new()
                .eq("success", true)
                .eq("operation", "rebuild")
                .matches(&meta)
        );
        assert!(!MetadataFilter::new().eq("missing", 1).matches(&meta));
    }

    #[test]
    fn collection_names_match_export_keys() {
        let names: Vec<&str> = Collection::ALL.iter().map(Collection::name).collect();
        assert_eq!(names, vec!["operations", "patterns", "errors", "macros"]);
        assert_eq!(serde_json::to_value(Collection::Macros).unwrap(), "macros");
    }
}
