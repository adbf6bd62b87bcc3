//! End-to-end integration tests for the CadLens context pipeline.
//!
//! These tests wire the event bus, knowledge store and context builder
//! together the way the CLI does, with the deterministic hashing embedder.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadlens_config::AppConfig;
use cadlens_context::{ContextBuilder, ContextSettings, ModelSnapshot, Purpose, SnapshotAdapter};
use cadlens_core::{CadAdapter, EventBus, EventFilter, EventKind, Payload, VectorStore, handler_fn};
use cadlens_knowledge::{KnowledgeStore, operation_tags};
use cadlens_memory::{FileVectorStore, HashingEmbedder, InMemoryVectorStore, SqliteVectorStore};
use serde_json::{Value, json};

// ── Helpers ──────────────────────────────────────────────────────────────

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn memory_knowledge() -> Arc<KnowledgeStore> {
    let embedder = Arc::new(HashingEmbedder::default());
    Arc::new(KnowledgeStore::new(Arc::new(InMemoryVectorStore::new(embedder))))
}

fn snapshot() -> ModelSnapshot {
    serde_json::from_value(json!({
        "model": {
            "title": "bracket",
            "type": "part",
            "path": "C:/parts/bracket.sldprt",
            "custom_properties": {"Material": "6061-T6"}
        },
        "features": [
            {"name": "Extrude1", "type": "Boss-Extrude", "dimensions": [{"name": "D1", "value": 10.0}]},
            {"name": "Fillet1", "type": "Fillet"},
            {"name": "Cut1", "type": "Cut-Extrude", "suppressed": true}
        ],
        "configurations": [
            {"name": "Default", "is_active": false},
            {"name": "Light", "is_active": true}
        ],
        "mass_properties": {"mass": 0.42, "volume": 0.000155, "surface_area": 0.0312}
    }))
    .unwrap()
}

// ── E2E: Event Bus → Context ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_rebuild_duration_reaches_context() {
    let bus = EventBus::default();
    bus.emit(
        EventKind::RebuildCompleted,
        payload(json!({"model": "x.part", "success": true, "duration": 1.2})),
    );

    let builder = ContextBuilder::new(memory_knowledge(), Some(bus), ContextSettings::default());
    let context = builder
        .build_context(
            None,
            &Purpose::AnalyzeModel,
            &payload(json!({"file_path": "x.part"})),
        )
        .await;

    assert!(context.starts_with("# CAD Model Analysis Request"));
    assert!(context.contains("## Recent Events"));
    let line = context
        .lines()
        .find(|l| l.contains("Model rebuilt successfully"))
        .expect("rebuild line present");
    assert!(line.contains("1.2"));
    assert!(context.contains("## Analysis Guidance"));
    assert!(context.ends_with("## User Request\n{\n  \"file_path\": \"x.part\"\n}"));
}

#[tokio::test]
async fn e2e_simulated_session_through_running_bus() {
    let bus = EventBus::with_poll_interval(100, Duration::from_millis(10));
    bus.start();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    bus.subscribe(
        EventFilter::Any,
        handler_fn(move |event| {
            recorder.lock().unwrap().push(event.kind.to_string());
            Ok(())
        }),
    );

    let session = [
        ("model_opened", json!({"file": "test.sldprt", "type": "part"})),
        ("feature_added", json!({"name": "Extrude1", "type": "extrusion"})),
        ("dimension_changed", json!({"feature": "Extrude1", "dimension": "D1", "old_value": 10, "new_value": 15})),
        ("rebuild_completed", json!({"model": "test.sldprt", "success": true, "duration": 1.2})),
        ("file_saved", json!({"path": "C:/Models/test.sldprt"})),
    ];
    let (saved, ()) = tokio::join!(
        bus.wait_for(EventKind::FileSaved, Some(Duration::from_secs(5))),
        async {
            for (kind, data) in session {
                bus.emit(kind, payload(data));
            }
        }
    );
    assert!(saved.is_some());

    // The wildcard handler runs after the waiter, so give the dispatcher a moment.
    for _ in 0..100 {
        if seen.lock().unwrap().len() == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["model_opened", "feature_added", "dimension_changed", "rebuild_completed", "file_saved"]
    );

    let stats = bus.statistics();
    assert_eq!(stats.total_events, 5);
    assert_eq!(stats.event_types.get("feature_added"), Some(&1));

    bus.shutdown().await;
    assert_eq!(bus.handler_count(&EventFilter::Any), 0);
}

#[tokio::test]
async fn e2e_wait_for_timeout_leaves_no_handlers() {
    let bus = EventBus::default();
    bus.start();

    let outcome = bus
        .wait_for(EventKind::ModelSaved, Some(Duration::from_millis(50)))
        .await;

    assert!(outcome.is_none());
    assert_eq!(bus.handler_count(&EventKind::ModelSaved.into()), 0);
    bus.shutdown().await;
}

#[tokio::test]
async fn e2e_history_is_bounded_and_ordered() {
    let bus = EventBus::new(10);
    for i in 0..25 {
        bus.emit(EventKind::DimensionChanged, payload(json!({"new_value": i})));
    }

    let all = bus.history(None, 100);
    assert_eq!(all.len(), 10);
    assert_eq!(all[0].data["new_value"], json!(15));

    let tail = bus.history(None, 3);
    let values: Vec<_> = tail.iter().map(|e| e.data["new_value"].clone()).collect();
    assert_eq!(values, vec![json!(22), json!(23), json!(24)]);
}

#[tokio::test]
async fn e2e_history_export_replays_into_new_bus() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");

    let bus = EventBus::default();
    bus.emit(EventKind::ModelOpened, payload(json!({"file": "a.sldprt"})));
    bus.emit("custom_probe", payload(json!({"ok": true})));
    assert_eq!(bus.export_history(&path).unwrap(), 2);

    let events: Vec<cadlens_core::Event> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let replay = EventBus::default();
    for event in events {
        replay.emit(event.kind, event.data);
    }

    let history = replay.history(None, 10);
    assert_eq!(history[0].kind, EventKind::ModelOpened);
    assert_eq!(history[1].kind, EventKind::Custom("custom_probe".into()));
}

// ── E2E: Knowledge Store ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_recorded_operation_is_found() {
    let knowledge = memory_knowledge();
    let id = knowledge
        .store_operation(
            "open_model",
            Payload::new(),
            payload(json!({"success": true})),
            true,
            vec!["part".into()],
        )
        .await
        .unwrap();

    for (i, operation) in ["export_model", "modify_dimension", "run_macro", "take_screenshot"]
        .iter()
        .enumerate()
    {
        knowledge
            .store_operation(
                operation,
                payload(json!({"step": i})),
                Payload::new(),
                i % 2 == 0,
                vec![operation.to_string()],
            )
            .await
            .unwrap();
    }

    let hits = knowledge
        .find_similar_operations("open_model part", 3, None)
        .await
        .unwrap();
    assert!(hits.len() <= 3);
    assert!(hits.iter().any(|h| h.id == id));
}

#[tokio::test]
async fn e2e_empty_collections_never_error() {
    let knowledge = memory_knowledge();
    assert!(knowledge.find_similar_operations("anything", 3, None).await.unwrap().is_empty());
    assert!(knowledge.find_error_solutions("boom", None, 3).await.unwrap().is_empty());
    assert_eq!(knowledge.analyze_patterns().await.unwrap().total_operations, 0);
}

#[tokio::test]
async fn e2e_export_import_across_backends() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashingEmbedder::default());
    let source = KnowledgeStore::new(Arc::new(FileVectorStore::new(
        dir.path().join("kb"),
        embedder.clone(),
    )));

    for (operation, file, success) in [
        ("open_model", "a.sldprt", true),
        ("modify_dimension", "a.sldprt", true),
        ("export_model", "top.sldasm", false),
    ] {
        let args = payload(json!({"file_path": file}));
        let tags = operation_tags(operation, &args);
        source
            .store_operation(operation, args, Payload::new(), success, tags)
            .await
            .unwrap();
    }
    source
        .store_design_pattern(
            "Weight reduction by shelling",
            "Hollow thick regions",
            "optimization",
            Payload::new(),
            vec![],
        )
        .await
        .unwrap();

    let export_path = dir.path().join("out").join("knowledge.json");
    let exported = source.export_all(&export_path).await.unwrap();
    assert_eq!(exported.total(), 4);

    let target_backend: Arc<dyn VectorStore> =
        Arc::new(SqliteVectorStore::new("sqlite::memory:", embedder).await.unwrap());
    let target = KnowledgeStore::new(target_backend);
    let imported = target.import_all(&export_path).await.unwrap();
    assert_eq!(imported, exported);

    let before = source.analyze_patterns().await.unwrap();
    let after = target.analyze_patterns().await.unwrap();
    assert_eq!(before.total_operations, after.total_operations);
    assert_eq!(before.successful_operations, after.successful_operations);
    assert_eq!(before.common_tags, after.common_tags);
    assert!(after.common_tags.iter().any(|(tag, count)| tag == "part" && *count == 2));
}

#[tokio::test]
async fn e2e_file_backend_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let open = || {
        KnowledgeStore::new(Arc::new(FileVectorStore::new(
            dir.path().to_path_buf(),
            Arc::new(HashingEmbedder::default()),
        )))
    };

    let first = open();
    first
        .store_error_solution(
            "Rebuild failed: dangling dimension",
            Payload::new(),
            "Repair dangling references",
            vec!["Find the first flagged feature".into()],
        )
        .await
        .unwrap();

    let second = open();
    let hits = second
        .find_error_solutions("dangling dimension", None, 3)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.solution_steps.len(), 1);
}

// ── E2E: Full Context Pipeline ───────────────────────────────────────────

#[tokio::test]
async fn e2e_optimization_context_with_model_and_knowledge() {
    let knowledge = memory_knowledge();
    knowledge
        .store_design_pattern(
            "Weight reduction by shelling",
            "Hollow thick solid regions with a shell feature",
            "optimization",
            Payload::new(),
            vec![],
        )
        .await
        .unwrap();
    knowledge
        .store_error_solution(
            "Rebuild failed: dangling dimension",
            Payload::new(),
            "Repair references lost after an upstream change",
            vec!["Edit the flagged sketch".into(), "Rebuild".into()],
        )
        .await
        .unwrap();

    let bus = EventBus::default();
    bus.emit(
        EventKind::RebuildFailed,
        payload(json!({"error": "Rebuild failed: dangling dimension"})),
    );

    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("bracket.json");
    std::fs::write(&snapshot_path, serde_json::to_string(&snapshot()).unwrap()).unwrap();
    let adapter = SnapshotAdapter::from_file(&snapshot_path).unwrap();
    adapter.connect().await.unwrap();

    let builder = ContextBuilder::new(knowledge, Some(bus), ContextSettings::default());
    let context = builder
        .build_context(
            Some(&adapter as &dyn CadAdapter),
            &Purpose::OptimizeDesign,
            &payload(json!({"optimization_goal": "reduce weight"})),
        )
        .await;

    assert!(context.starts_with("# Design Optimization Request"));
    assert!(context.contains("## Current Model State"));
    assert!(context.contains("Active Configuration: Light"));
    assert!(context.contains("### Relevant Design Patterns"));
    assert!(context.contains("- Weight reduction by shelling"));
    assert!(context.contains("### Potential Solutions for Recent Errors"));
    assert!(context.contains("  - Edit the flagged sketch"));
    assert!(context.contains("## Optimization Strategy"));
    assert!(context.contains("Optimization Goal: reduce weight"));

    let order = [
        "## Current Model State",
        "## Relevant Knowledge",
        "## Recent Events",
        "## Optimization Strategy",
        "## User Request",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|h| context.find(h).unwrap_or_else(|| panic!("missing {h}")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn e2e_variants_list_current_dimensions() {
    let adapter = SnapshotAdapter::new(snapshot());
    adapter.connect().await.unwrap();

    let builder = ContextBuilder::new(memory_knowledge(), None, ContextSettings::default());
    let context = builder
        .build_context(
            Some(&adapter as &dyn CadAdapter),
            &Purpose::CreateVariants,
            &payload(json!({"parameters": ["D1"], "count": 3})),
        )
        .await;

    assert!(context.contains("## Variant Generation"));
    assert!(context.contains("Current parameter values"));
    assert!(context.contains("D1"));
}

#[tokio::test]
async fn e2e_cache_serves_identical_document() {
    let bus = EventBus::default();
    let builder = ContextBuilder::new(memory_knowledge(), Some(bus.clone()), ContextSettings::default());
    let args = payload(json!({"file_path": "a.sldprt", "depth": 2}));

    let first = builder.build_or_cached(None, &Purpose::AnalyzeModel, &args).await;
    bus.emit(EventKind::ModelSaved, Payload::new());
    let second = builder.build_or_cached(None, &Purpose::AnalyzeModel, &args).await;
    assert_eq!(first, second);

    // Key order in the arguments does not change the cache key.
    let reordered = payload(json!({"depth": 2, "file_path": "a.sldprt"}));
    assert_eq!(builder.get_cached(&Purpose::AnalyzeModel, &reordered), Some(first));

    builder.clear_cache();
    assert!(builder.get_cached(&Purpose::AnalyzeModel, &args).is_none());
}

// ── E2E: Configuration System ────────────────────────────────────────────

#[tokio::test]
async fn e2e_config_defaults_and_validation() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.context.cache_ttl(), Duration::from_secs(300));
    assert_eq!(config.events.history_capacity, 1000);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[knowledge]\nbackend = \"sqlite\"\n\n[context]\nrecent_events = 7\n").unwrap();
    let loaded = AppConfig::load_from(&path).unwrap();
    assert_eq!(loaded.knowledge.backend, "sqlite");
    assert_eq!(loaded.context.recent_events, 7);
    assert_eq!(loaded.context.similar_operations, 3);

    let mut broken = AppConfig::default();
    broken.knowledge.embedding_provider = "openai".into();
    assert!(broken.validate().is_err());
}
