//! The knowledge store: typed store/find over a [`VectorStore`].

use crate::document::{
    DesignPattern, ErrorSolution, KnowledgeDocument, MacroPattern, OperationRecord,
};
use cadlens_core::error::KnowledgeError;
use cadlens_core::store::{Collection, MetadataFilter, ScoredDocument, VectorStore};
use cadlens_core::{Payload, canonical_json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A decoded query hit.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeHit<T> {
    pub id: String,
    pub score: f32,
    #[serde(flatten)]
    pub record: T,
}

/// Aggregate view over every stored operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub success_rate: f64,
    pub operation_types: BTreeMap<String, usize>,
    /// Up to ten `(tag, count)` pairs, most frequent first.
    pub common_tags: Vec<(String, usize)>,
}

/// Document count per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeCounts {
    pub operations: usize,
    pub patterns: usize,
    pub errors: usize,
    pub macros: usize,
}

impl KnowledgeCounts {
    pub fn total(&self) -> usize {
        self.operations + self.patterns + self.errors + self.macros
    }

    pub(crate) fn slot(&mut self, collection: Collection) -> &mut usize {
        match collection {
            Collection::Operations => &mut self.operations,
            Collection::Patterns => &mut self.patterns,
            Collection::Errors => &mut self.errors,
            Collection::Macros => &mut self.macros,
        }
    }
}

/// Content-addressed store of operations, design patterns, error solutions
/// and macro patterns, searchable by meaning.
pub struct KnowledgeStore {
    backend: Arc<dyn VectorStore>,
}

impl KnowledgeStore {
    pub fn new(backend: Arc<dyn VectorStore>) -> Self {
        Self { backend }
    }

    /// Name of the underlying vector store.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Upsert any record under its content-addressed ID.
    pub async fn put(&self, document: KnowledgeDocument) -> Result<String, KnowledgeError> {
        let id = document.id();
        let collection = document.collection();
        self.backend
            .add_document(
                collection,
                &document.searchable_text(),
                document.to_metadata(),
                &id,
            )
            .await?;
        debug!(%collection, id = %id, "Stored knowledge document");
        Ok(id)
    }

    pub async fn store_operation(
        &self,
        operation: &str,
        context: Payload,
        result: Payload,
        success: bool,
        tags: Vec<String>,
    ) -> Result<String, KnowledgeError> {
        let id = self
            .put(KnowledgeDocument::Operation(OperationRecord {
                operation: operation.to_string(),
                context,
                result,
                success,
                tags,
                timestamp: Utc::now(),
            }))
            .await?;
        info!(operation, id = %id, "Stored operation");
        Ok(id)
    }

    pub async fn store_design_pattern(
        &self,
        name: &str,
        description: &str,
        pattern_type: &str,
        implementation: Payload,
        examples: Vec<Value>,
    ) -> Result<String, KnowledgeError> {
        self.put(KnowledgeDocument::Pattern(DesignPattern {
            name: name.to_string(),
            description: description.to_string(),
            pattern_type: pattern_type.to_string(),
            implementation,
            examples,
            timestamp: Utc::now(),
        }))
        .await
    }

    pub async fn store_error_solution(
        &self,
        error_message: &str,
        error_context: Payload,
        solution: &str,
        solution_steps: Vec<String>,
    ) -> Result<String, KnowledgeError> {
        self.put(KnowledgeDocument::ErrorSolution(ErrorSolution {
            error_message: error_message.to_string(),
            error_context,
            solution: solution.to_string(),
            solution_steps,
            timestamp: Utc::now(),
        }))
        .await
    }

    pub async fn store_macro_pattern(
        &self,
        macro_name: &str,
        description: &str,
        code_snippet: &str,
        use_cases: Vec<String>,
        parameters: Payload,
    ) -> Result<String, KnowledgeError> {
        self.put(KnowledgeDocument::MacroPattern(MacroPattern {
            macro_name: macro_name.to_string(),
            description: description.to_string(),
            code_snippet: code_snippet.to_string(),
            use_cases,
            parameters,
            timestamp: Utc::now(),
        }))
        .await
    }

    pub async fn find_similar_operations(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<KnowledgeHit<OperationRecord>>, KnowledgeError> {
        let hits = self
            .backend
            .query(Collection::Operations, query, limit, filter)
            .await?;
        Ok(decode_hits(Collection::Operations, hits, |doc| match doc {
            KnowledgeDocument::Operation(op) => Some(op),
            _ => None,
        }))
    }

    pub async fn find_design_patterns(
        &self,
        query: &str,
        pattern_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit<DesignPattern>>, KnowledgeError> {
        let filter = pattern_type.map(|t| MetadataFilter::new().eq("pattern_type", t));
        let hits = self
            .backend
            .query(Collection::Patterns, query, limit, filter.as_ref())
            .await?;
        Ok(decode_hits(Collection::Patterns, hits, |doc| match doc {
            KnowledgeDocument::Pattern(p) => Some(p),
            _ => None,
        }))
    }

    /// Solutions for errors resembling `error_message`. The optional
    /// context is folded into the query text.
    pub async fn find_error_solutions(
        &self,
        error_message: &str,
        context: Option<&Payload>,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit<ErrorSolution>>, KnowledgeError> {
        let context = Value::Object(context.cloned().unwrap_or_default());
        let query = format!("{error_message} {}", canonical_json(&context));
        let hits = self
            .backend
            .query(Collection::Errors, &query, limit, None)
            .await?;
        Ok(decode_hits(Collection::Errors, hits, |doc| match doc {
            KnowledgeDocument::ErrorSolution(e) => Some(e),
            _ => None,
        }))
    }

    pub async fn find_macro_patterns(
        &self,
        use_case: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit<MacroPattern>>, KnowledgeError> {
        let hits = self
            .backend
            .query(Collection::Macros, use_case, limit, None)
            .await?;
        Ok(decode_hits(Collection::Macros, hits, |doc| match doc {
            KnowledgeDocument::MacroPattern(m) => Some(m),
            _ => None,
        }))
    }

    /// Most recent operations first.
    pub async fn operation_history(
        &self,
        limit: usize,
        success_only: bool,
    ) -> Result<Vec<OperationRecord>, KnowledgeError> {
        let mut operations: Vec<OperationRecord> = self
            .operations()
            .await?
            .into_iter()
            .filter(|op| !success_only || op.success)
            .collect();
        operations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        operations.truncate(limit);
        Ok(operations)
    }

    /// Success rate, operation type counts and the most common tags.
    pub async fn analyze_patterns(&self) -> Result<PatternAnalysis, KnowledgeError> {
        let operations = self.operations().await?;
        if operations.is_empty() {
            return Ok(PatternAnalysis::default());
        }

        let total = operations.len();
        let successful = operations.iter().filter(|op| op.success).count();

        let mut operation_types = BTreeMap::new();
        let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
        for op in &operations {
            *operation_types.entry(op.operation.clone()).or_insert(0) += 1;
            for tag in &op.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        let mut common_tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
        // BTreeMap iteration already has tags ascending; a stable sort keeps that for ties.
        common_tags.sort_by(|a, b| b.1.cmp(&a.1));
        common_tags.truncate(10);

        Ok(PatternAnalysis {
            total_operations: total,
            successful_operations: successful,
            success_rate: successful as f64 / total as f64,
            operation_types,
            common_tags,
        })
    }

    pub async fn counts(&self) -> Result<KnowledgeCounts, KnowledgeError> {
        let mut counts = KnowledgeCounts::default();
        for collection in Collection::ALL {
            *counts.slot(collection) = self.backend.count(collection).await?;
        }
        Ok(counts)
    }

    /// Every decodable record in `collection`, in storage order.
    pub async fn documents(
        &self,
        collection: Collection,
    ) -> Result<Vec<KnowledgeDocument>, KnowledgeError> {
        Ok(self
            .backend
            .get_all(collection)
            .await?
            .iter()
            .filter_map(|doc| KnowledgeDocument::decode(collection, doc))
            .collect())
    }

    async fn operations(&self) -> Result<Vec<OperationRecord>, KnowledgeError> {
        Ok(self
            .documents(Collection::Operations)
            .await?
            .into_iter()
            .filter_map(|doc| match doc {
                KnowledgeDocument::Operation(op) => Some(op),
                _ => None,
            })
            .collect())
    }
}

fn decode_hits<T>(
    collection: Collection,
    hits: Vec<ScoredDocument>,
    project: impl Fn(KnowledgeDocument) -> Option<T>,
) -> Vec<KnowledgeHit<T>> {
    hits.into_iter()
        .filter_map(|hit| {
            let stored = cadlens_core::StoredDocument {
                id: hit.id,
                text: hit.text,
                metadata: hit.metadata,
                embedding: Vec::new(),
                stored_at: hit.stored_at,
            };
            let record = project(KnowledgeDocument::decode(collection, &stored)?)?;
            Some(KnowledgeHit {
                id: stored.id,
                score: hit.score,
                record,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlens_memory::{HashingEmbedder, InMemoryVectorStore};
    use serde_json::json;

    fn store() -> KnowledgeStore {
        KnowledgeStore::new(Arc::new(InMemoryVectorStore::new(Arc::new(
            HashingEmbedder::default(),
        ))))
    }

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn storing_twice_is_idempotent() {
        let ks = store();
        let a = ks
            .store_operation("open_model", Payload::new(), Payload::new(), true, vec![])
            .await
            .unwrap();
        let b = ks
            .store_operation("open_model", Payload::new(), Payload::new(), false, vec![])
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(ks.counts().await.unwrap().operations, 1);

        // Last write wins.
        let history = ks.operation_history(10, false).await.unwrap();
        assert!(!history[0].success);
    }

    #[tokio::test]
    async fn different_context_yields_different_id() {
        let ks = store();
        let a = ks
            .store_operation("rebuild", payload(json!({"part": "A"})), Payload::new(), true, vec![])
            .await
            .unwrap();
        let b = ks
            .store_operation("rebuild", payload(json!({"part": "B"})), Payload::new(), true, vec![])
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(ks.counts().await.unwrap().operations, 2);
    }

    #[tokio::test]
    async fn similar_operation_is_found_in_top_three() {
        let ks = store();
        for (op, tags) in [
            ("export_pdf", vec!["drawing"]),
            ("add_fillet", vec!["feature"]),
            ("change_dimension", vec!["sketch"]),
            ("save_as", vec!["file"]),
        ] {
            ks.store_operation(op, Payload::new(), Payload::new(), true, tags.into_iter().map(String::from).collect())
                .await
                .unwrap();
        }
        let id = ks
            .store_operation(
                "open_model",
                Payload::new(),
                payload(json!({"success": true})),
                true,
                vec!["part".into()],
            )
            .await
            .unwrap();

        let hits = ks.find_similar_operations("open_model part", 3, None).await.unwrap();
        assert!(hits.len() <= 3);
        assert!(hits.iter().any(|h| h.id == id));
        assert_eq!(hits[0].record.operation, "open_model");
    }

    #[tokio::test]
    async fn find_never_exceeds_limit_and_tolerates_empty() {
        let ks = store();
        assert!(ks.find_similar_operations("anything", 5, None).await.unwrap().is_empty());
        assert!(ks.find_error_solutions("boom", None, 3).await.unwrap().is_empty());

        for i in 0..8 {
            ks.store_operation(&format!("op_{i}"), Payload::new(), Payload::new(), true, vec![])
                .await
                .unwrap();
        }
        assert_eq!(ks.find_similar_operations("op", 5, None).await.unwrap().len(), 5);
        assert!(ks.find_similar_operations("op", 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_filter_on_operations() {
        let ks = store();
        ks.store_operation("rebuild", payload(json!({"n": 1})), Payload::new(), true, vec![])
            .await
            .unwrap();
        ks.store_operation("rebuild", payload(json!({"n": 2})), Payload::new(), false, vec![])
            .await
            .unwrap();

        let filter = MetadataFilter::new().eq("success", false);
        let hits = ks.find_similar_operations("rebuild", 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.context["n"], json!(2));

        assert_eq!(ks.operation_history(10, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn design_patterns_filter_by_type() {
        let ks = store();
        ks.store_design_pattern("Shell body", "Hollow out solids", "weight_reduction", Payload::new(), vec![])
            .await
            .unwrap();
        ks.store_design_pattern("Standard holes", "Use stock drill sizes", "cost_reduction", Payload::new(), vec![])
            .await
            .unwrap();

        let hits = ks
            .find_design_patterns("reduce", Some("weight_reduction"), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.name, "Shell body");
    }

    #[tokio::test]
    async fn error_solutions_round_trip_steps() {
        let ks = store();
        ks.store_error_solution(
            "Rebuild failed: sketch not fully defined",
            payload(json!({"feature": "Extrude1"})),
            "Fully define the sketch",
            vec!["Open sketch".into(), "Add dimensions".into()],
        )
        .await
        .unwrap();

        let hits = ks
            .find_error_solutions("Rebuild failed", Some(&payload(json!({"feature": "Extrude1"}))), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.solution_steps.len(), 2);
        assert_eq!(hits[0].record.error_context["feature"], json!("Extrude1"));
    }

    #[tokio::test]
    async fn macro_patterns_are_searchable_by_use_case() {
        let ks = store();
        ks.store_macro_pattern(
            "BatchExport",
            "Export every configuration",
            "Sub main()\nEnd Sub",
            vec!["export".into(), "batch".into()],
            payload(json!({"format": "step"})),
        )
        .await
        .unwrap();

        let hits = ks.find_macro_patterns("batch export", 5).await.unwrap();
        assert_eq!(hits[0].record.macro_name, "BatchExport");
        assert_eq!(hits[0].record.parameters["format"], json!("step"));
    }

    #[tokio::test]
    async fn analysis_counts_types_and_tags() {
        let ks = store();
        let ops = [
            ("open_model", 1, true, vec!["part", "io"]),
            ("open_model", 2, true, vec!["part"]),
            ("rebuild", 3, false, vec!["io", "part"]),
            ("export", 4, true, vec!["drawing"]),
        ];
        for (op, n, success, tags) in ops {
            ks.store_operation(
                op,
                payload(json!({"n": n})),
                Payload::new(),
                success,
                tags.into_iter().map(String::from).collect(),
            )
            .await
            .unwrap();
        }

        let analysis = ks.analyze_patterns().await.unwrap();
        assert_eq!(analysis.total_operations, 4);
        assert_eq!(analysis.successful_operations, 3);
        assert!((analysis.success_rate - 0.75).abs() < 1e-9);
        assert_eq!(analysis.operation_types["open_model"], 2);
        assert_eq!(
            analysis.common_tags,
            vec![("part".to_string(), 3), ("io".to_string(), 2), ("drawing".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn analysis_of_empty_store() {
        let analysis = store().analyze_patterns().await.unwrap();
        assert_eq!(analysis.total_operations, 0);
        assert_eq!(analysis.success_rate, 0.0);
    }
}
