//! # CadLens Core
//!
//! Domain types, traits, and error definitions for the CadLens context
//! pipeline, plus the in-process event bus that every other crate observes.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the CAD adapter, the
//! embedding provider and the vector store. Implementations live in their
//! respective crates. This enables:
//! - Swapping backends via configuration
//! - Easy testing with stub adapters and deterministic embedders
//! - Clean dependency graph (all crates depend inward on core)

pub mod adapter;
pub mod canonical;
pub mod error;
pub mod event;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use adapter::{CadAdapter, Configuration, Dimension, Feature, MassProperties, ModelInfo};
pub use canonical::{Payload, canonical_json, canonical_value};
pub use error::{AdapterError, Error, EventError, KnowledgeError, MemoryError, Result};
pub use event::{
    Event, EventBus, EventFilter, EventHandler, EventKind, EventStatistics, SubscriptionId,
    handler_fn,
};
pub use store::{Collection, Embedder, MetadataFilter, ScoredDocument, StoredDocument, VectorStore};
