//! CAD adapter trait: the live view into the engineering tool.
//!
//! Concrete adapters (COM automation, version-specific bridges) live outside
//! this workspace. The context pipeline only reads model state through this
//! trait and treats every call as slow and fallible.

use crate::error::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of the active document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub title: String,

    /// Document type as reported by the tool (`part`, `assembly`, `drawing`).
    #[serde(rename = "type", default)]
    pub model_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_configuration: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: BTreeMap<String, String>,
}

/// A driving dimension of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: f64,
}

/// One entry of the feature tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,

    #[serde(rename = "type")]
    pub feature_type: String,

    #[serde(default)]
    pub suppressed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,

    #[serde(default)]
    pub is_active: bool,
}

/// Mass properties in SI units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    /// kg
    pub mass: f64,
    /// m³
    pub volume: f64,
    /// m²
    pub surface_area: f64,
}

/// The adapter contract consumed by the context builder.
///
/// Any method may fail; callers degrade gracefully instead of propagating.
#[async_trait]
pub trait CadAdapter: Send + Sync {
    /// A human-readable adapter name (e.g., "sw2024", "snapshot").
    fn name(&self) -> &str;

    /// Whether the adapter currently holds a live connection.
    fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<(), AdapterError>;

    async fn disconnect(&self) -> Result<(), AdapterError>;

    async fn model_info(&self) -> Result<ModelInfo, AdapterError>;

    async fn features(&self) -> Result<Vec<Feature>, AdapterError>;

    async fn configurations(&self) -> Result<Vec<Configuration>, AdapterError>;

    /// Mass properties; fails for documents without solid bodies.
    async fn mass_properties(&self) -> Result<MassProperties, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_deserializes_from_tool_json() {
        let json = r#"{"name":"Extrude1","type":"Boss-Extrude","dimensions":[{"name":"D1","value":10.0}]}"#;
        let feature: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(feature.feature_type, "Boss-Extrude");
        assert!(!feature.suppressed);
        assert_eq!(feature.dimensions[0].name, "D1");
    }

    #[test]
    fn model_info_defaults_optional_fields() {
        let info: ModelInfo = serde_json::from_str(r#"{"title":"bracket"}"#).unwrap();
        assert_eq!(info.title, "bracket");
        assert!(info.path.is_none());
        assert!(info.custom_properties.is_empty());
    }
}
