//! SQLite vector store.
//!
//! A single `documents` table keyed by `(collection, id)`. Embeddings are
//! stored as little-endian `f32` blobs and ranked in process with the
//! shared cosine routine, so results match the other backends exactly.

use crate::vector::rank_documents;
use async_trait::async_trait;
use cadlens_core::Payload;
use cadlens_core::error::MemoryError;
use cadlens_core::store::{
    Collection, Embedder, MetadataFilter, ScoredDocument, StoredDocument, VectorStore,
};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A persistent vector store on SQLite.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    /// Open the database at `path`, creating it and its schema if needed.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str, embedder: Arc<dyn Embedder>) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool, embedder };
        store.run_migrations().await?;
        info!("SQLite vector store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection   TEXT NOT NULL,
                id           TEXT NOT NULL,
                text         TEXT NOT NULL,
                metadata     TEXT NOT NULL DEFAULT '{}',
                embedding    BLOB,
                stored_at    TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("documents table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `StoredDocument` from a row. A corrupted metadata column
    /// degrades to an empty map instead of failing the whole query.
    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<StoredDocument, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let text: String = row
            .try_get("text")
            .map_err(|e| MemoryError::QueryFailed(format!("text column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| MemoryError::QueryFailed(format!("metadata column: {e}")))?;
        let stored_at_str: String = row
            .try_get("stored_at")
            .map_err(|e| MemoryError::QueryFailed(format!("stored_at column: {e}")))?;

        let metadata: Payload = serde_json::from_str(&metadata_json).unwrap_or_else(|e| {
            warn!(id = %id, error = %e, "Ignoring corrupted metadata");
            Payload::new()
        });

        let stored_at = chrono::DateTime::parse_from_rfc3339(&stored_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let blob: Option<Vec<u8>> = row.try_get("embedding").ok().flatten();
        let embedding = blob.map(|b| blob_to_embedding(&b)).unwrap_or_default();

        Ok(StoredDocument {
            id,
            text,
            metadata,
            embedding,
            stored_at,
        })
    }

    async fn load_collection(&self, collection: Collection) -> Result<Vec<StoredDocument>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM documents WHERE collection = ?1 ORDER BY rowid")
            .bind(collection.name())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("SELECT {collection}: {e}")))?;
        rows.iter().map(Self::row_to_document).collect()
    }
}

/// Serialize an embedding vector to bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add_document(
        &self,
        collection: Collection,
        text: &str,
        metadata: Payload,
        id: &str,
    ) -> Result<(), MemoryError> {
        let embedding = self.embedder.embed(text).await?;
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, text, metadata, embedding, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(collection, id) DO UPDATE SET
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(collection.name())
        .bind(id)
        .bind(text)
        .bind(&metadata_json)
        .bind(embedding_to_blob(&embedding))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

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
        let documents = self.load_collection(collection).await?;
        Ok(rank_documents(&documents, &query_embedding, limit, filter))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, MemoryError> {
        self.load_collection(collection).await
    }

    async fn count(&self, collection: Collection) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM documents WHERE collection = ?1")
            .bind(collection.name())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT failed: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT column: {e}")))?;
        Ok(count as usize)
    }

    async fn clear(&self, collection: Collection) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM documents WHERE collection = ?1")
            .bind(collection.name())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use serde_json::json;

    async fn test_store() -> SqliteVectorStore {
        SqliteVectorStore::new("sqlite::memory:", Arc::new(HashingEmbedder::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn store_and_query() {
        let db = test_store().await;
        let meta = json!({"operation": "open_model", "success": true})
            .as_object()
            .cloned()
            .unwrap();
        db.add_document(Collection::Operations, "open_model part", meta, "op1")
            .await
            .unwrap();
        db.add_document(Collection::Operations, "export_pdf drawing", Payload::new(), "op2")
            .await
            .unwrap();

        let hits = db
            .query(Collection::Operations, "open_model part", 3, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "op1");
        assert_eq!(hits[0].metadata["success"], true);
    }

    #[tokio::test]
    async fn upsert_on_conflict() {
        let db = test_store().await;
        db.add_document(Collection::Patterns, "Version 1", Payload::new(), "p").await.unwrap();
        db.add_document(Collection::Patterns, "Version 2", Payload::new(), "p").await.unwrap();

        assert_eq!(db.count(Collection::Patterns).await.unwrap(), 1);
        let all = db.get_all(Collection::Patterns).await.unwrap();
        assert_eq!(all[0].text, "Version 2");
        assert_eq!(all[0].embedding.len(), 256);
    }

    #[tokio::test]
    async fn same_id_in_different_collections() {
        let db = test_store().await;
        db.add_document(Collection::Errors, "e", Payload::new(), "shared").await.unwrap();
        db.add_document(Collection::Macros, "m", Payload::new(), "shared").await.unwrap();
        assert_eq!(db.count(Collection::Errors).await.unwrap(), 1);
        assert_eq!(db.count(Collection::Macros).await.unwrap(), 1);

        db.clear(Collection::Errors).await.unwrap();
        assert_eq!(db.count(Collection::Errors).await.unwrap(), 0);
        assert_eq!(db.count(Collection::Macros).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filter_applies() {
        let db = test_store().await;
        for (id, success) in [("a", true), ("b", false), ("c", true)] {
            let meta = json!({"success": success}).as_object().cloned().unwrap();
            db.add_document(Collection::Operations, "rebuild", meta, id).await.unwrap();
        }
        let filter = MetadataFilter::new().eq("success", false);
        let hits = db
            .query(Collection::Operations, "rebuild", 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&v)), v);
    }
}
