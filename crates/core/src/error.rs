//! Error types for the CadLens domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all CadLens operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Vector store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Knowledge store errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- CAD adapter errors ---
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    // --- Event bus errors ---
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Vector store error: {0}")]
    Store(#[from] MemoryError),

    #[error("I/O error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid knowledge document: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("Adapter is not connected")]
    NotConnected,

    #[error("No active document")]
    NoActiveDocument,

    #[error("Adapter call {operation} failed: {reason}")]
    CallFailed { operation: String, reason: String },

    #[error("Operation not supported by this adapter: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Error)]
pub enum EventError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Failed to export event history to {path}: {reason}")]
    Export { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_error_displays_correctly() {
        let err = Error::Adapter(AdapterError::CallFailed {
            operation: "mass_properties".into(),
            reason: "no solid bodies".into(),
        });
        assert!(err.to_string().contains("mass_properties"));
        assert!(err.to_string().contains("no solid bodies"));
    }

    #[test]
    fn memory_error_converts_into_knowledge_error() {
        let err: KnowledgeError = MemoryError::QueryFailed("collection locked".into()).into();
        assert!(matches!(err, KnowledgeError::Store(_)));
        assert!(err.to_string().contains("collection locked"));
    }
}
