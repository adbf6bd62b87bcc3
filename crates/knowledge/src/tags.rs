//! Tag derivation for recorded operations.

use cadlens_core::Payload;
use serde_json::Value;
use std::path::Path;

/// Tags for an operation: its own name, the document kind implied by a
/// `file_path` argument, and a coarse operation category.
pub fn operation_tags(operation: &str, arguments: &Payload) -> Vec<String> {
    let mut tags = vec![operation.to_string()];

    let document_kind = arguments
        .get("file_path")
        .and_then(Value::as_str)
        .and_then(|p| Path::new(p).extension())
        .and_then(|e| e.to_str())
        .and_then(|ext| match ext.to_lowercase().as_str() {
            "part" | "prt" | "sldprt" | "ipt" => Some("part"),
            "asm" | "assembly" | "sldasm" | "iam" => Some("assembly"),
            "drw" | "drawing" | "slddrw" | "idw" => Some("drawing"),
            _ => None,
        });
    if let Some(kind) = document_kind {
        tags.push(kind.to_string());
    }

    let category = match operation {
        "modify_dimension" | "update_design_table" => Some("parametric"),
        "export_model" | "take_screenshot" => Some("export"),
        "run_macro" => Some("automation"),
        _ => None,
    };
    if let Some(category) = category {
        tags.push(category.to_string());
    }

    tags
}
