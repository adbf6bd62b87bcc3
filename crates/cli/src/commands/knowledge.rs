//! `cadlens knowledge`: knowledge base management.

use crate::runtime;
use cadlens_core::Collection;
use cadlens_knowledge::{KnowledgeExport, KnowledgeHit, operation_tags};
use serde_json::{Value, json};
use std::path::Path;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Starter design patterns, error fixes and macros.
const SEED_KNOWLEDGE: &str = include_str!("../../assets/seed_knowledge.json");

const FAILURE_SOLUTION: &str = "Check the error message and verify inputs";
const FAILURE_STEPS: [&str; 3] = [
    "Verify file paths",
    "Check the CAD application is running",
    "Validate arguments",
];

pub async fn stats() -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let counts = store.counts().await?;
    let analysis = store.analyze_patterns().await?;

    println!("🧠 Knowledge Statistics");
    println!("=======================");
    println!("  Backend:     {}", store.backend_name());
    println!("  Location:    {}", config.knowledge.resolved_path().display());
    println!("  Embeddings:  {}", config.knowledge.embedding_provider);
    println!("  Operations:  {}", counts.operations);
    println!("  Patterns:    {}", counts.patterns);
    println!("  Errors:      {}", counts.errors);
    println!("  Macros:      {}", counts.macros);

    if analysis.total_operations > 0 {
        println!(
            "\n  Success rate: {:.1}% ({}/{})",
            analysis.success_rate * 100.0,
            analysis.successful_operations,
            analysis.total_operations
        );
        for (operation, count) in &analysis.operation_types {
            println!("    {operation:<24} {count}");
        }
        if !analysis.common_tags.is_empty() {
            let tags: Vec<String> = analysis
                .common_tags
                .iter()
                .map(|(tag, count)| format!("{tag} ({count})"))
                .collect();
            println!("  Common tags: {}", tags.join(", "));
        }
    }

    Ok(())
}

pub async fn search(query: &str, collection: Collection, limit: usize) -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;

    println!("🔍 Searching {collection} for: \"{query}\"\n");

    let lines: Vec<(f32, String)> = match collection {
        Collection::Operations => summarize(
            store.find_similar_operations(query, limit, None).await?,
            |op| {
                let outcome = if op.success { "ok" } else { "failed" };
                format!("{} [{outcome}] tags: {}", op.operation, op.tags.join(", "))
            },
        ),
        Collection::Patterns => summarize(
            store.find_design_patterns(query, None, limit).await?,
            |p| format!("{} ({}): {}", p.name, p.pattern_type, p.description),
        ),
        Collection::Errors => summarize(
            store.find_error_solutions(query, None, limit).await?,
            |e| format!("{} → {}", e.error_message, e.solution),
        ),
        Collection::Macros => summarize(
            store.find_macro_patterns(query, limit).await?,
            |m| format!("{}: {}", m.macro_name, m.description),
        ),
    };

    if lines.is_empty() {
        println!("   No matches. Run `cadlens knowledge seed` to load starter knowledge.");
    }
    for (i, (score, line)) in lines.iter().enumerate() {
        println!("  {:>2}. [score: {score:.2}] {line}", i + 1);
    }

    Ok(())
}

fn summarize<T>(hits: Vec<KnowledgeHit<T>>, line: impl Fn(&T) -> String) -> Vec<(f32, String)> {
    hits.into_iter()
        .map(|hit| (hit.score, line(&hit.record)))
        .collect()
}

pub async fn errors(message: &str, limit: usize) -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let solutions = store.find_error_solutions(message, None, limit).await?;

    if solutions.is_empty() {
        println!("No known solutions for: {message}");
        return Ok(());
    }

    println!("🔧 Solutions for: \"{message}\"\n");
    for hit in solutions {
        println!("  [score: {:.2}] {}", hit.score, hit.record.error_message);
        println!("    {}", hit.record.solution);
        for step in &hit.record.solution_steps {
            println!("      - {step}");
        }
    }

    Ok(())
}

pub async fn history(limit: usize, success_only: bool) -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let operations = store.operation_history(limit, success_only).await?;

    if operations.is_empty() {
        println!("No operations recorded.");
        return Ok(());
    }

    for op in operations {
        let marker = if op.success { "✅" } else { "❌" };
        println!(
            "  {marker} {} {}  [{}]",
            op.timestamp.format("%Y-%m-%d %H:%M:%S"),
            op.operation,
            op.tags.join(", ")
        );
    }

    Ok(())
}

/// Store an operation outcome. Failures also record a generic error fix
/// keyed by the reported error.
pub async fn record(operation: &str, args: &str, result: &str, success: bool) -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let arguments = runtime::parse_object(args, "args")?;
    let result = runtime::parse_object(result, "result")?;

    let tags = operation_tags(operation, &arguments);
    let id = store
        .store_operation(operation, arguments.clone(), result.clone(), success, tags)
        .await?;
    println!("✅ Recorded {operation} ({id})");

    if !success {
        let message = result
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{operation} failed"));
        let error_context = json!({"tool": operation, "arguments": arguments});
        let error_context = error_context.as_object().cloned().unwrap_or_default();
        let id = store
            .store_error_solution(
                &message,
                error_context,
                FAILURE_SOLUTION,
                FAILURE_STEPS.iter().map(|s| s.to_string()).collect(),
            )
            .await?;
        println!("✅ Recorded error \"{message}\" ({id})");
    }

    Ok(())
}

pub async fn export(path: &Path) -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let counts = store.export_all(path).await?;
    println!(
        "✅ Exported {} records to {} ({} operations, {} patterns, {} errors, {} macros)",
        counts.total(),
        path.display(),
        counts.operations,
        counts.patterns,
        counts.errors,
        counts.macros
    );
    Ok(())
}

pub async fn import(path: &Path) -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let summary = store.import_all(path).await?;
    println!("✅ Imported {} records from {}", summary.total(), path.display());
    Ok(())
}

pub async fn seed() -> CmdResult {
    let config = runtime::load_config()?;
    let store = runtime::knowledge_store(&config).await?;
    let export = seed_knowledge()?;
    let summary = store.import_snapshot(export).await?;
    println!(
        "🌱 Seeded {} patterns, {} error solutions and {} macros",
        summary.patterns, summary.errors, summary.macros
    );
    Ok(())
}

fn seed_knowledge() -> Result<KnowledgeExport, serde_json::Error> {
    serde_json::from_str(SEED_KNOWLEDGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_data_parses() {
        let export = seed_knowledge().unwrap();
        let counts = export.counts();
        assert!(counts.patterns >= 3);
        assert!(counts.errors >= 1);
        assert!(counts.macros >= 1);
        // Optimization patterns cover every goal keyword.
        for goal in ["weight", "cost", "strength"] {
            assert!(
                export
                    .patterns
                    .iter()
                    .any(|p| p.pattern_type == "optimization" && p.name.to_lowercase().contains(goal)),
                "no pattern for {goal}"
            );
        }
    }
}
