//! `cadlens events`: event bus utilities.

use crate::runtime;
use cadlens_core::{Event, EventBus, EventFilter, EventHandler, EventKind, Payload, handler_fn};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A short part-editing session ending in a save.
pub fn simulated_session() -> Vec<(EventKind, Payload)> {
    let session = [
        (EventKind::ModelOpened, json!({"file": "test.sldprt", "type": "part"})),
        (EventKind::FeatureAdded, json!({"name": "Extrude1", "type": "extrusion"})),
        (
            EventKind::DimensionChanged,
            json!({"feature": "Extrude1", "dimension": "D1", "old_value": 10, "new_value": 15}),
        ),
        (EventKind::RebuildStarted, json!({"model": "test.sldprt"})),
        (
            EventKind::RebuildCompleted,
            json!({"model": "test.sldprt", "success": true, "duration": 1.2}),
        ),
        (EventKind::ConfigurationActivated, json!({"name": "Config2"})),
        (EventKind::FileSaved, json!({"path": "C:/Models/test.sldprt"})),
    ];
    session
        .into_iter()
        .map(|(kind, data)| match data {
            Value::Object(map) => (kind, map),
            _ => (kind, Payload::new()),
        })
        .collect()
}

/// Emit the simulated session and wait until the final save has been dispatched.
pub async fn run_session(bus: &EventBus) -> Option<Arc<Event>> {
    // `join!` polls the waiter first, so it is subscribed before anything is emitted.
    let (saved, ()) = tokio::join!(
        bus.wait_for(EventKind::FileSaved, Some(Duration::from_secs(5))),
        async {
            for (kind, data) in simulated_session() {
                bus.emit(kind, data);
            }
        }
    );
    saved
}

/// Logs every dispatched event with its payload.
fn logging_handler() -> Arc<dyn EventHandler> {
    handler_fn(|event| {
        let data = Value::Object(event.data.clone());
        info!(kind = %event.kind, data = %data, "Event");
        Ok(())
    })
}

pub async fn simulate(export: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let bus = runtime::event_bus(&config);
    bus.start();

    bus.subscribe(EventFilter::Any, logging_handler());

    println!("📡 Simulating a CAD editing session\n");
    match run_session(&bus).await {
        Some(last) => println!("  ✅ Session dispatched, last event {}", last.id),
        None => println!("  ⚠️  Timed out waiting for the session to finish"),
    }

    let stats = bus.statistics();
    println!("\n  Total events:  {}", stats.total_events);
    println!("  Events/min:    {:.1}", stats.events_per_minute);
    for (kind, count) in &stats.event_types {
        println!("    {kind:<24} {count}");
    }

    if let Some(path) = export {
        let written = bus.export_history(&path)?;
        println!("\n  ✅ Exported {written} events to {}", path.display());
    }

    bus.shutdown().await;
    Ok(())
}
