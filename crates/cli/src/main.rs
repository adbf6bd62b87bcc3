//! CadLens CLI, the main entry point.
//!
//! Commands:
//! - `onboard`    Initialize config and knowledge directories
//! - `doctor`     Diagnose configuration and storage
//! - `context`    Build a context document for a purpose
//! - `knowledge`  Inspect, search and move the knowledge base
//! - `events`     Exercise the event bus

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "cadlens",
    about = "CadLens: context assembly for AI assistants working on CAD models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and knowledge directories
    Onboard,

    /// Diagnose configuration and storage health
    Doctor,

    /// Build the context document for a purpose
    Context {
        /// analyze_model, optimize_design, create_variants or any custom name
        #[arg(short, long, default_value = "analyze_model")]
        purpose: String,

        /// Request arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Model snapshot JSON to read model state from
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Exported event history to replay before building
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Knowledge base management
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Event bus utilities
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Show collection sizes and operation analysis
    Stats,

    /// Semantic search in one collection
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value_t = CollectionArg::Operations)]
        collection: CollectionArg,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Find known solutions for an error message
    Errors {
        message: String,

        #[arg(short, long, default_value_t = 3)]
        limit: usize,
    },

    /// Show recent operations
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        success_only: bool,
    },

    /// Record the outcome of an operation
    Record {
        operation: String,

        /// Operation arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Operation result as a JSON object
        #[arg(short, long, default_value = "{}")]
        result: String,

        /// Mark the operation as failed
        #[arg(long)]
        failed: bool,
    },

    /// Export all knowledge to a JSON file
    Export { path: PathBuf },

    /// Import knowledge from a JSON export
    Import { path: PathBuf },

    /// Load the built-in starter knowledge
    Seed,
}

#[derive(Subcommand)]
enum EventsAction {
    /// Emit a typical editing session and print bus statistics
    Simulate {
        /// Write the resulting history to this file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectionArg {
    Operations,
    Patterns,
    Errors,
    Macros,
}

impl From<CollectionArg> for cadlens_core::Collection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Operations => Self::Operations,
            CollectionArg::Patterns => Self::Patterns,
            CollectionArg::Errors => Self::Errors,
            CollectionArg::Macros => Self::Macros,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Context {
            purpose,
            args,
            snapshot,
            events,
        } => commands::context::run(&purpose, &args, snapshot, events).await?,
        Commands::Knowledge { action } => match action {
            KnowledgeAction::Stats => commands::knowledge::stats().await?,
            KnowledgeAction::Search {
                query,
                collection,
                limit,
            } => commands::knowledge::search(&query, collection.into(), limit).await?,
            KnowledgeAction::Errors { message, limit } => {
                commands::knowledge::errors(&message, limit).await?
            }
            KnowledgeAction::History {
                limit,
                success_only,
            } => commands::knowledge::history(limit, success_only).await?,
            KnowledgeAction::Record {
                operation,
                args,
                result,
                failed,
            } => commands::knowledge::record(&operation, &args, &result, !failed).await?,
            KnowledgeAction::Export { path } => commands::knowledge::export(&path).await?,
            KnowledgeAction::Import { path } => commands::knowledge::import(&path).await?,
            KnowledgeAction::Seed => commands::knowledge::seed().await?,
        },
        Commands::Events { action } => match action {
            EventsAction::Simulate { export } => commands::events::simulate(export).await?,
        },
    }

    Ok(())
}
