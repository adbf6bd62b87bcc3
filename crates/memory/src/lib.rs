//! Vector store backends and embedding providers for CadLens.

pub mod embedding;
pub mod file_backend;
pub mod in_memory;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use embedding::{HashingEmbedder, HttpEmbedder};
pub use file_backend::FileVectorStore;
pub use in_memory::InMemoryVectorStore;
pub use vector::{cosine_similarity, rank_documents};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;
