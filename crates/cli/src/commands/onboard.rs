//! `cadlens onboard`: first-time setup.

use cadlens_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("📐 CadLens: First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    // The file backend keeps one JSONL file per collection in this directory.
    let config = AppConfig::load_from(&config_path)?;
    let knowledge_path = config.knowledge.resolved_path();
    if config.knowledge.backend == "file" && !knowledge_path.exists() {
        std::fs::create_dir_all(&knowledge_path)?;
        println!("✅ Created knowledge directory: {}", knowledge_path.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Run: cadlens knowledge seed");
    println!("   2. Run: cadlens context --purpose analyze_model --args '{{\"file_path\": \"bracket.part\"}}'");
    println!("\n🎉 Setup complete!\n");

    Ok(())
}
