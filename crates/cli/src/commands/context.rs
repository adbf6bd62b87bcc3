//! `cadlens context`: build and print a context document.

use crate::runtime;
use cadlens_context::{Purpose, SnapshotAdapter};
use cadlens_core::{CadAdapter, Event, EventBus};
use std::path::{Path, PathBuf};
use tracing::info;

pub async fn run(
    purpose: &str,
    args: &str,
    snapshot: Option<PathBuf>,
    events: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let arguments = runtime::parse_object(args, "args")?;
    let purpose = Purpose::from_name(purpose);

    let knowledge = runtime::knowledge_store(&config).await?;

    let bus = match events {
        Some(path) => {
            let bus = runtime::event_bus(&config);
            let replayed = replay_history(&bus, &path)?;
            info!(count = replayed, path = %path.display(), "Replayed event history");
            Some(bus)
        }
        None => None,
    };

    let adapter = match snapshot {
        Some(path) => {
            let adapter = SnapshotAdapter::from_file(&path)?;
            adapter.connect().await?;
            Some(adapter)
        }
        None => None,
    };

    let builder = runtime::context_builder(&config, knowledge, bus);
    let document = builder
        .build_context(
            adapter.as_ref().map(|a| a as &dyn CadAdapter),
            &purpose,
            &arguments,
        )
        .await;

    println!("{document}");
    Ok(())
}

/// Re-emit every event of an exported history file, oldest first.
fn replay_history(bus: &EventBus, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read events from {}: {e}", path.display()))?;
    let events: Vec<Event> = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid event history in {}: {e}", path.display()))?;
    let count = events.len();
    for event in events {
        bus.emit(event.kind, event.data);
    }
    Ok(count)
}
