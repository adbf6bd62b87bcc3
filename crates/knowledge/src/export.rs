//! Whole-store export and import.
//!
//! The export format is a single JSON object with one array per
//! collection. Importing replays each record through the typed store path,
//! so IDs are re-derived rather than trusted from the file.

use crate::document::{
    DesignPattern, ErrorSolution, KnowledgeDocument, MacroPattern, OperationRecord,
};
use crate::store::{KnowledgeCounts, KnowledgeStore};
use cadlens_core::error::KnowledgeError;
use cadlens_core::store::Collection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// In-memory form of an export file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeExport {
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
    #[serde(default)]
    pub patterns: Vec<DesignPattern>,
    #[serde(default)]
    pub errors: Vec<ErrorSolution>,
    #[serde(default)]
    pub macros: Vec<MacroPattern>,
}

impl KnowledgeExport {
    pub fn counts(&self) -> KnowledgeCounts {
        KnowledgeCounts {
            operations: self.operations.len(),
            patterns: self.patterns.len(),
            errors: self.errors.len(),
            macros: self.macros.len(),
        }
    }
}

/// Records written per collection by an import.
pub type ImportSummary = KnowledgeCounts;

impl KnowledgeStore {
    /// Every record, grouped by collection.
    pub async fn snapshot(&self) -> Result<KnowledgeExport, KnowledgeError> {
        let mut export = KnowledgeExport::default();
        for collection in Collection::ALL {
            for doc in self.documents(collection).await? {
                match doc {
                    KnowledgeDocument::Operation(op) => export.operations.push(op),
                    KnowledgeDocument::Pattern(p) => export.patterns.push(p),
                    KnowledgeDocument::ErrorSolution(e) => export.errors.push(e),
                    KnowledgeDocument::MacroPattern(m) => export.macros.push(m),
                }
            }
        }
        Ok(export)
    }

    /// Replay every record of `export` into this store.
    pub async fn import_snapshot(
        &self,
        export: KnowledgeExport,
    ) -> Result<ImportSummary, KnowledgeError> {
        let documents = export
            .operations
            .into_iter()
            .map(KnowledgeDocument::Operation)
            .chain(export.patterns.into_iter().map(KnowledgeDocument::Pattern))
            .chain(export.errors.into_iter().map(KnowledgeDocument::ErrorSolution))
            .chain(export.macros.into_iter().map(KnowledgeDocument::MacroPattern));

        let mut summary = ImportSummary::default();
        for doc in documents {
            let collection = doc.collection();
            self.put(doc).await?;
            *summary.slot(collection) += 1;
        }
        Ok(summary)
    }

    /// Write the whole store to `path` as pretty JSON.
    pub async fn export_all(&self, path: &Path) -> Result<KnowledgeCounts, KnowledgeError> {
        let export = self.snapshot().await?;
        let json = serde_json::to_string_pretty(&export)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| io_error(path, e))?;

        let counts = export.counts();
        info!(path = %path.display(), total = counts.total(), "Exported knowledge");
        Ok(counts)
    }

    /// Load an export file written by [`KnowledgeStore::export_all`].
    pub async fn import_all(&self, path: &Path) -> Result<ImportSummary, KnowledgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let export: KnowledgeExport = serde_json::from_str(&content)?;
        let summary = self.import_snapshot(export).await?;
        info!(path = %path.display(), total = summary.total(), "Imported knowledge");
        Ok(summary)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> KnowledgeError {
    KnowledgeError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlens_core::Payload;
    use cadlens_memory::{HashingEmbedder, InMemoryVectorStore};
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> KnowledgeStore {
        KnowledgeStore::new(Arc::new(InMemoryVectorStore::new(Arc::new(
            HashingEmbedder::default(),
        ))))
    }

    async fn seeded() -> KnowledgeStore {
        let ks = store();
        ks.store_operation(
            "open_model",
            json!({"file": "bracket.part"}).as_object().cloned().unwrap(),
            Payload::new(),
            true,
            vec!["part".into()],
        )
        .await
        .unwrap();
        ks.store_operation("rebuild", Payload::new(), Payload::new(), false, vec!["part".into()])
            .await
            .unwrap();
        ks.store_design_pattern("Ribs", "Stiffen thin walls", "strength", Payload::new(), vec![json!({"part": "cover"})])
            .await
            .unwrap();
        ks.store_error_solution("Zero thickness geometry", Payload::new(), "Offset the face", vec![])
            .await
            .unwrap();
        ks.store_macro_pattern("ExportStep", "Save as STEP", "Sub main()", vec!["export".into()], Payload::new())
            .await
            .unwrap();
        ks
    }

    #[tokio::test]
    async fn export_then_import_preserves_counts_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("knowledge.json");

        let source = seeded().await;
        let exported = source.export_all(&path).await.unwrap();
        assert_eq!(exported.total(), 5);

        let target = store();
        let summary = target.import_all(&path).await.unwrap();
        assert_eq!(summary, exported);
        assert_eq!(target.counts().await.unwrap(), source.counts().await.unwrap());

        let before = source.analyze_patterns().await.unwrap();
        let after = target.analyze_patterns().await.unwrap();
        assert_eq!(before.total_operations, after.total_operations);
        assert_eq!(before.successful_operations, after.successful_operations);

        let ids = |docs: Vec<KnowledgeDocument>| {
            let mut ids: Vec<String> = docs.iter().map(KnowledgeDocument::id).collect();
            ids.sort();
            ids
        };
        assert_eq!(
            ids(source.documents(Collection::Operations).await.unwrap()),
            ids(target.documents(Collection::Operations).await.unwrap())
        );
    }

    #[tokio::test]
    async fn export_file_has_one_array_per_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        seeded().await.export_all(&path).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["operations"].as_array().unwrap().len(), 2);
        assert_eq!(value["patterns"][0]["examples"][0]["part"], "cover");
        assert_eq!(value["errors"][0]["solution"], "Offset the face");
        assert_eq!(value["macros"][0]["macro_name"], "ExportStep");
    }

    #[tokio::test]
    async fn import_tolerates_missing_sections_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"operations":[{"operation":"open_model","success":true}]}"#).unwrap();

        let ks = store();
        let summary = ks.import_all(&path).await.unwrap();
        assert_eq!(summary.operations, 1);
        assert_eq!(summary.total(), 1);
    }

    #[tokio::test]
    async fn import_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let ks = store();

        let missing = ks.import_all(&dir.path().join("absent.json")).await;
        assert!(matches!(missing, Err(KnowledgeError::Io { .. })));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(matches!(ks.import_all(&garbage).await, Err(KnowledgeError::Format(_))));
    }
}
