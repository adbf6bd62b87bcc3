//! File-based vector store: persistent JSON-lines storage.
//!
//! One JSONL file per collection inside a directory. Each line is a
//! JSON-encoded `StoredDocument`, embedding included, so queries after a
//! restart rank against exactly what was stored.
//!
//! Storage location: `~/.cadlens/knowledge/<collection>.jsonl`

use crate::vector::{rank_documents, upsert};
use async_trait::async_trait;
use cadlens_core::Payload;
use cadlens_core::error::MemoryError;
use cadlens_core::store::{
    Collection, Embedder, MetadataFilter, ScoredDocument, StoredDocument, VectorStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A file-backed vector store using JSONL (one JSON object per line).
///
/// Collections are loaded into memory on creation and the affected
/// collection is rewritten on every mutation. Fast reads, durable writes.
pub struct FileVectorStore {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<Collection, Vec<StoredDocument>>>,
}

impl FileVectorStore {
    /// Open (or lazily create) a store rooted at `dir`.
    pub fn new(dir: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        let mut collections = HashMap::new();
        for collection in Collection::ALL {
            let documents = Self::load_from_disk(&Self::collection_path(&dir, collection));
            if !documents.is_empty() {
                collections.insert(collection, documents);
            }
        }
        debug!(dir = %dir.display(), "File vector store loaded");
        Self {
            dir,
            embedder,
            collections: RwLock::new(collections),
        }
    }

    fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
        dir.join(format!("{}.jsonl", collection.name()))
    }

    /// Load documents from a JSONL file, skipping lines that fail to parse.
    fn load_from_disk(path: &Path) -> Vec<StoredDocument> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(), // Not created yet
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<StoredDocument>(line) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupted document");
                    None
                }
            })
            .collect()
    }

    /// Rewrite one collection's file from the given documents.
    fn flush(&self, collection: Collection, documents: &[StoredDocument]) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MemoryError::Storage(format!("Failed to create knowledge directory: {e}"))
        })?;

        let mut content = String::new();
        for doc in documents {
            let line = serde_json::to_string(doc)
                .map_err(|e| MemoryError::Storage(format!("Failed to serialize document: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let path = Self::collection_path(&self.dir, collection);
        std::fs::write(&path, &content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write {}: {e}", path.display())))
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    fn name(&self) -> &str {
        "file"
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

        // Write the new file contents before touching the in-memory copy.
        let mut collections = self.collections.write().await;
        let mut documents = collections.get(&collection).cloned().unwrap_or_default();
        upsert(&mut documents, document);
        self.flush(collection, &documents)?;
        collections.insert(collection, documents);
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
        let mut collections = self.collections.write().await;
        self.flush(collection, &[])?;
        collections.remove(&collection);
        Ok(())
    }
}
