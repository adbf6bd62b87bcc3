//! # CadLens Context
//!
//! Builds the context document handed to an AI assistant working on a CAD
//! model. See [`builder`] for the section layout.

pub mod builder;
pub mod cache;
pub mod purpose;
mod sections;
pub mod snapshot;

pub use builder::{ContextBuilder, ContextSettings};
pub use cache::{ContextCache, DEFAULT_CACHE_TTL};
pub use purpose::Purpose;
pub use snapshot::{ModelSnapshot, SnapshotAdapter};
