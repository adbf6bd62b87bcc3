//! # CadLens Knowledge
//!
//! Content-addressed knowledge about CAD work: operations and their
//! outcomes, design patterns, error solutions and macro snippets. Records
//! are stored through a [`cadlens_core::VectorStore`] and retrieved by
//! semantic similarity.
//!
//! Storing the same record twice yields the same ID, so every store call
//! is an idempotent upsert.

pub mod document;
pub mod export;
pub mod store;
pub mod tags;

pub use document::{
    DesignPattern, ErrorSolution, KnowledgeDocument, MacroPattern, OperationRecord, document_id,
};
pub use export::{ImportSummary, KnowledgeExport};
pub use store::{KnowledgeCounts, KnowledgeHit, KnowledgeStore, PatternAnalysis};
pub use tags::operation_tags;
