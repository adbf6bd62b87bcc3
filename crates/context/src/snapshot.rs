//! An adapter that serves model state from a JSON snapshot.
//!
//! Lets the CLI and tests build model-aware context without a running CAD
//! application. Snapshot format:
//!
//! ```json
//! {
//!   "model": {"title": "bracket", "type": "part", "path": "C:/parts/bracket.part"},
//!   "features": [{"name": "Extrude1", "type": "Boss-Extrude", "dimensions": [{"name": "D1", "value": 10.0}]}],
//!   "configurations": [{"name": "Default", "is_active": true}],
//!   "mass_properties": {"mass": 0.42, "volume": 0.00015, "surface_area": 0.031}
//! }
//! ```

use async_trait::async_trait;
use cadlens_core::adapter::{CadAdapter, Configuration, Feature, MassProperties, ModelInfo};
use cadlens_core::error::AdapterError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Everything a [`SnapshotAdapter`] can report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub model: ModelInfo,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
    /// Absent for documents without solid bodies.
    #[serde(default)]
    pub mass_properties: Option<MassProperties>,
}

pub struct SnapshotAdapter {
    snapshot: ModelSnapshot,
    connected: AtomicBool,
}

impl SnapshotAdapter {
    /// A disconnected adapter over `snapshot`.
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            snapshot,
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, AdapterError> {
        let load_failed = |reason: String| AdapterError::CallFailed {
            operation: "load_snapshot".into(),
            reason: format!("{}: {reason}", path.display()),
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let snapshot: ModelSnapshot =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        Ok(Self::new(snapshot))
    }

    fn ensure_connected(&self) -> Result<(), AdapterError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AdapterError::NotConnected)
        }
    }
}

#[async_trait]
impl CadAdapter for SnapshotAdapter {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.connected.store(true, Ordering::SeqCst);
        info!(model = %self.snapshot.model.title, "Snapshot adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn model_info(&self) -> Result<ModelInfo, AdapterError> {
        self.ensure_connected()?;
        Ok(self.snapshot.model.clone())
    }

    async fn features(&self) -> Result<Vec<Feature>, AdapterError> {
        self.ensure_connected()?;
        Ok(self.snapshot.features.clone())
    }

    async fn configurations(&self) -> Result<Vec<Configuration>, AdapterError> {
        self.ensure_connected()?;
        Ok(self.snapshot.configurations.clone())
    }

    async fn mass_properties(&self) -> Result<MassProperties, AdapterError> {
        self.ensure_connected()?;
        self.snapshot
            .mass_properties
            .ok_or_else(|| AdapterError::Unsupported("mass properties".into()))
    }
}
