//! Vector similarity and ranking utilities shared by every backend.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Nearest-neighbour ranking with a deterministic tie-break
//! - In-place upsert of a document list

use cadlens_core::store::{MetadataFilter, ScoredDocument, StoredDocument};
use std::cmp::Ordering;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank documents by cosine similarity to a query embedding.
///
/// Documents failing `filter` are dropped. The result is sorted by
/// descending similarity; equal scores put the most recently stored
/// document first, then order by ID so the ranking is fully deterministic.
pub fn rank_documents<'a>(
    documents: impl IntoIterator<Item = &'a StoredDocument>,
    query_embedding: &[f32],
    limit: usize,
    filter: Option<&MetadataFilter>,
) -> Vec<ScoredDocument> {
    let mut scored: Vec<ScoredDocument> = documents
        .into_iter()
        .filter(|doc| filter.is_none_or(|f| f.matches(&doc.metadata)))
        .map(|doc| ScoredDocument {
            id: doc.id.clone(),
            text: doc.text.clone(),
            metadata: doc.metadata.clone(),
            score: cosine_similarity(&doc.embedding, query_embedding),
            stored_at: doc.stored_at,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.stored_at.cmp(&a.stored_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(limit);
    scored
}

/// Replace the document with the same ID, or append it.
pub fn upsert(documents: &mut Vec<StoredDocument>, document: StoredDocument) {
    match documents.iter_mut().find(|d| d.id == document.id) {
        Some(existing) => *existing = document,
        None => documents.push(document),
    }
}
