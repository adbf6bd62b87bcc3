//! `cadlens doctor`: diagnose configuration and storage.

use crate::runtime;
use cadlens_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 CadLens Doctor: System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults. Run `cadlens onboard` to create one");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the configuration before running other checks.");
            return Ok(());
        }
    };

    println!(
        "  ✅ Embeddings: {} ({} dimensions)",
        config.knowledge.embedding_provider, config.knowledge.embedding_dimensions
    );

    match runtime::knowledge_store(&config).await {
        Ok(store) => match store.counts().await {
            Ok(counts) => {
                println!(
                    "  ✅ Knowledge backend '{}' at {} ({} records)",
                    store.backend_name(),
                    config.knowledge.resolved_path().display(),
                    counts.total()
                );
                if counts.total() == 0 {
                    println!("  ⚠️  Knowledge base is empty. Run `cadlens knowledge seed`");
                    issues += 1;
                }
            }
            Err(e) => {
                println!("  ❌ Knowledge backend unreadable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Knowledge backend failed to open: {e}");
            issues += 1;
        }
    }

    println!(
        "  ✅ Event history capacity {} (poll every {} ms)",
        config.events.history_capacity, config.events.poll_interval_ms
    );

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
