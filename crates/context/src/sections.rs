//! Rendering of the individual context sections.
//!
//! Everything here is synchronous and pure: the builder gathers data, these
//! functions turn it into text.

use cadlens_core::adapter::{Configuration, Feature, MassProperties, ModelInfo};
use cadlens_core::event::{Event, EventKind, EventStatistics};
use cadlens_core::Payload;
use cadlens_knowledge::{DesignPattern, ErrorSolution, KnowledgeHit, OperationRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Number of feature types listed in the summary.
const TOP_FEATURE_TYPES: usize = 5;

/// Default number of variants when the request does not say.
const DEFAULT_VARIANT_COUNT: u64 = 5;

/// Prefix `body` with a second-level heading.
pub(crate) fn section(heading: &str, body: &str) -> String {
    format!("## {heading}\n{body}")
}

/// Strings render bare, everything else as compact JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field(data: &Payload, key: &str) -> String {
    data.get(key)
        .map(display_value)
        .unwrap_or_else(|| "unknown".to_string())
}

// ── Model state ───────────────────────────────────────────────────────────

/// Live model state as gathered from the adapter. `None` means that call failed.
#[derive(Debug, Default)]
pub(crate) struct ModelState {
    pub info: ModelInfo,
    pub features: Option<Vec<Feature>>,
    pub configurations: Option<Vec<Configuration>>,
    pub mass: Option<MassProperties>,
}

pub(crate) fn model_state(state: &ModelState) -> String {
    let info = &state.info;
    let mut blocks = Vec::new();

    let mut header = vec![
        format!("Model: {}", or_unknown(&info.title)),
        format!("Type: {}", or_unknown(&info.model_type)),
        format!("Path: {}", info.path.as_deref().unwrap_or("Unknown")),
    ];
    if let Some(configurations) = &state.configurations {
        let names: Vec<&str> = configurations.iter().map(|c| c.name.as_str()).collect();
        header.push(format!("Configurations: {}", names.join(", ")));
    }
    let active = info.active_configuration.clone().or_else(|| {
        state
            .configurations
            .as_ref()
            .and_then(|c| c.iter().find(|c| c.is_active))
            .map(|c| c.name.clone())
    });
    header.push(format!(
        "Active Configuration: {}",
        active.as_deref().unwrap_or("Default")
    ));
    blocks.push(header.join("\n"));

    if let Some(features) = &state.features {
        blocks.push(format!("Features Summary:\n{}", feature_summary(features)));
    }

    if let Some(mass) = &state.mass {
        blocks.push(format!(
            "Mass Properties:\n- Mass: {:.3} kg\n- Volume: {:.6} m³\n- Surface Area: {:.4} m²",
            mass.mass, mass.volume, mass.surface_area
        ));
    }

    if !info.custom_properties.is_empty() {
        let lines: Vec<String> = info
            .custom_properties
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect();
        blocks.push(format!("Custom Properties:\n{}", lines.join("\n")));
    }

    blocks.join("\n\n")
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { "Unknown" } else { s }
}

/// Total count, the most common feature types and the suppressed count.
pub(crate) fn feature_summary(features: &[Feature]) -> String {
    if features.is_empty() {
        return "No features found".to_string();
    }

    let mut types: BTreeMap<&str, usize> = BTreeMap::new();
    for feature in features {
        *types.entry(feature.feature_type.as_str()).or_insert(0) += 1;
    }
    let mut types: Vec<(&str, usize)> = types.into_iter().collect();
    types.sort_by(|a, b| b.1.cmp(&a.1));

    let mut lines = vec![
        format!("Total features: {}", features.len()),
        "Feature types:".to_string(),
    ];
    lines.extend(
        types
            .iter()
            .take(TOP_FEATURE_TYPES)
            .map(|(t, n)| format!("  - {t}: {n}")),
    );

    let suppressed = features.iter().filter(|f| f.suppressed).count();
    if suppressed > 0 {
        lines.push(format!("Suppressed features: {suppressed}"));
    }
    lines.join("\n")
}

// ── Knowledge ─────────────────────────────────────────────────────────────

pub(crate) fn similar_operations(hits: &[KnowledgeHit<OperationRecord>]) -> String {
    let mut lines = vec!["### Similar Previous Operations".to_string()];
    for hit in hits {
        let op = &hit.record;
        let outcome = op
            .result
            .get("summary")
            .map(display_value)
            .unwrap_or_else(|| (if op.success { "Completed" } else { "Failed" }).to_string());
        lines.push(format!("- {}: {outcome}", op.operation));
    }
    lines.join("\n")
}

pub(crate) fn design_patterns(hits: &[KnowledgeHit<DesignPattern>]) -> String {
    let mut lines = vec!["### Relevant Design Patterns".to_string()];
    lines.extend(
        hits.iter()
            .map(|h| format!("- {}: {}", h.record.name, h.record.description)),
    );
    lines.join("\n")
}

pub(crate) fn error_solutions(hits: &[KnowledgeHit<ErrorSolution>]) -> String {
    let mut lines = vec!["### Potential Solutions for Recent Errors".to_string()];
    for hit in hits {
        lines.push(format!("- {}", hit.record.solution));
        lines.extend(hit.record.solution_steps.iter().map(|s| format!("  - {s}")));
    }
    lines.join("\n")
}

/// The message carried by an error-like event, if any.
pub(crate) fn error_message(event: &Event) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| event.data.get(*key))
        .map(display_value)
        .find(|m| !m.is_empty())
}

// ── Events ────────────────────────────────────────────────────────────────

/// One human-readable line per event.
pub(crate) fn describe_event(event: &Event) -> String {
    let data = &event.data;
    match &event.kind {
        EventKind::DimensionChanged => format!(
            "Dimension {} changed from {} to {}",
            field(data, "dimension"),
            field(data, "old_value"),
            field(data, "new_value")
        ),
        EventKind::FeatureAdded => {
            format!("Added feature: {} ({})", field(data, "name"), field(data, "type"))
        }
        EventKind::RebuildCompleted => {
            let duration = data.get("duration").map(display_value).unwrap_or_else(|| "0".into());
            format!("Model rebuilt successfully in {duration}s")
        }
        EventKind::RebuildFailed => format!(
            "Rebuild failed: {}",
            error_message(event).unwrap_or_else(|| "unknown error".into())
        ),
        EventKind::ModelOpened => {
            let model = data
                .get("path")
                .or_else(|| data.get("title"))
                .map(display_value)
                .unwrap_or_else(|| "unknown".into());
            format!("Opened model: {model}")
        }
        EventKind::ConfigurationActivated => {
            let name = data
                .get("configuration")
                .or_else(|| data.get("name"))
                .map(display_value)
                .unwrap_or_else(|| "unknown".into());
            format!("Activated configuration: {name}")
        }
        other => format!("{other}: {}", Value::Object(data.clone())),
    }
}

pub(crate) fn recent_events(events: &[std::sync::Arc<Event>], stats: &EventStatistics) -> String {
    let mut lines = vec!["Recent actions and events:".to_string()];
    lines.extend(events.iter().map(|e| format!("- {}", describe_event(e))));
    format!(
        "{}\n\nEvent statistics: {} total events ({:.1} events/min)",
        lines.join("\n"),
        stats.total_events,
        stats.events_per_minute
    )
}

// ── Purpose-specific ──────────────────────────────────────────────────────

const ANALYSIS_CHECKLIST: [&str; 5] = [
    "Design intent and parametric relationships",
    "Potential manufacturing issues",
    "Best practices compliance",
    "Performance considerations",
    "Cost reduction opportunities",
];

pub(crate) fn analysis_guidance(arguments: &Payload) -> String {
    let mut blocks = Vec::new();
    if let Some(focus) = arguments
        .get("file_path")
        .and_then(Value::as_str)
        .and_then(file_focus)
    {
        blocks.push(focus.to_string());
    }
    let checklist: Vec<String> = ANALYSIS_CHECKLIST.iter().map(|c| format!("- {c}")).collect();
    blocks.push(format!("Analysis should cover:\n{}", checklist.join("\n")));
    blocks.join("\n\n")
}

fn file_focus(file_path: &str) -> Option<&'static str> {
    let ext = Path::new(file_path).extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "part" | "prt" | "sldprt" | "ipt" => {
            Some("Analyzing a part file - focus on geometry, features, and manufacturability")
        }
        "asm" | "assembly" | "sldasm" | "iam" => Some(
            "Analyzing an assembly - focus on component relationships, mates, and interference",
        ),
        "drw" | "drawing" | "slddrw" | "idw" => {
            Some("Analyzing a drawing - focus on views, dimensions, and annotations")
        }
        _ => None,
    }
}

const OPTIMIZATION_STRATEGIES: [(&str, &str, [&str; 5]); 3] = [
    (
        "weight",
        "Weight Optimization Strategies",
        [
            "Material removal in low-stress areas",
            "Topology optimization",
            "Lattice structures",
            "Thin-wall design",
            "Material substitution",
        ],
    ),
    (
        "cost",
        "Cost Optimization Strategies",
        [
            "Simplify geometry",
            "Reduce part count",
            "Standardize components",
            "Optimize for manufacturing processes",
            "Minimize material waste",
        ],
    ),
    (
        "strength",
        "Strength Optimization Strategies",
        [
            "Add reinforcement ribs",
            "Optimize wall thickness",
            "Improve stress distribution",
            "Eliminate stress concentrations",
            "Consider material properties",
        ],
    ),
];

/// The requested optimization goal, if any.
pub(crate) fn optimization_goal(arguments: &Payload) -> Option<String> {
    arguments
        .get("optimization_goal")
        .map(display_value)
        .filter(|g| !g.trim().is_empty())
}

pub(crate) fn optimization_strategy(arguments: &Payload) -> String {
    let goal = optimization_goal(arguments).unwrap_or_else(|| "general optimization".into());
    let lowered = goal.to_lowercase();
    let mut out = format!("Optimization Goal: {goal}");

    if let Some((_, title, items)) = OPTIMIZATION_STRATEGIES
        .iter()
        .find(|(keyword, _, _)| lowered.contains(keyword))
    {
        let items: Vec<String> = items.iter().map(|i| format!("- {i}")).collect();
        out.push_str(&format!("\n\n{title}:\n{}", items.join("\n")));
    }
    out
}

const VARIANT_STRATEGIES: [&str; 4] = [
    "Use Design of Experiments (DOE) approach",
    "Consider parameter interactions",
    "Maintain design constraints",
    "Focus on meaningful variations",
];

/// Requested variant parameters: a JSON array of names or a comma-separated string.
pub(crate) fn variant_parameters(arguments: &Payload) -> Vec<String> {
    match arguments.get("parameters") {
        Some(Value::Array(items)) => items.iter().map(display_value).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// `features` is `None` when no connected adapter could supply them.
pub(crate) fn variant_generation(arguments: &Payload, features: Option<&[Feature]>) -> String {
    let count = arguments
        .get("count")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_VARIANT_COUNT);
    let parameters = variant_parameters(arguments);

    let mut blocks = vec![format!(
        "Creating {count} design variants\nVariable parameters: {}",
        parameters.join(", ")
    )];

    if let Some(features) = features {
        let current: Vec<String> = features
            .iter()
            .flat_map(|f| f.dimensions.iter())
            .filter(|d| parameters.contains(&d.name))
            .map(|d| format!("- {}: {}", d.name, d.value))
            .collect();
        if !current.is_empty() {
            blocks.push(format!("Current parameter values:\n{}", current.join("\n")));
        }
    }

    let strategies: Vec<String> = VARIANT_STRATEGIES.iter().map(|s| format!("- {s}")).collect();
    blocks.push(format!("Variant generation strategies:\n{}", strategies.join("\n")));
    blocks.join("\n\n")
}
