//! In-memory vector store: useful for testing and ephemeral sessions.

use crate::vector::{rank_documents, upsert};
use async_trait::async_trait;
use cadlens_core::Payload;
use cadlens_core::error::MemoryError;
use cadlens_core::store::{
    Collection, Embedder, MetadataFilter, ScoredDocument, StoredDocument, VectorStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A vector store that keeps every collection in a `Vec`.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<Collection, Vec<StoredDocument>>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add_document(
        &self,
        collection: Collection,
        text: &str,
        metadata: Payload,
        id: &str,
    ) -> Result<(), MemoryError> {
        let embedding = self.embedder.embed(text).await?;
        let document = StoredDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
            embedding,
            stored_at: Utc::now(),
        };
        upsert(
            self.collections.write().await.entry(collection).or_default(),
            document,
        );
        debug!(%collection, id, "Stored document");
        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredDocument>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(text).await?;
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(rank_documents(documents, &query_embedding, limit, filter))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, MemoryError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn count(&self, collection: Collection) -> Result<usize, MemoryError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map_or(0, Vec::len))
    }

    async fn clear(&self, collection: Collection) -> Result<(), MemoryError> {
        self.collections.write().await.remove(&collection);
        Ok(())
    }
}
