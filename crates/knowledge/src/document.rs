//! Knowledge records and their vector-store encoding.
//!
//! Every record becomes one [`StoredDocument`]: a searchable text that gets
//! embedded, plus a flat metadata map. Nested fields are stored as JSON
//! strings and decoded one field at a time, so a single corrupted field
//! never costs the whole record.

use cadlens_core::store::{Collection, StoredDocument};
use cadlens_core::{Payload, canonical_json};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Deterministic document ID: SHA-256 of `primary + "_" + canonical_json(context)`.
pub fn document_id(primary: &str, context: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(primary.as_bytes());
    hasher.update(b"_");
    hasher.update(canonical_json(context).as_bytes());
    hex::encode(hasher.finalize())
}

/// A CAD operation and how it turned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: String,
    #[serde(default)]
    pub context: Payload,
    #[serde(default)]
    pub result: Payload,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A reusable design pattern or best practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignPattern {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pattern_type: String,
    #[serde(default)]
    pub implementation: Payload,
    #[serde(default)]
    pub examples: Vec<Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// An error message paired with a known fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSolution {
    pub error_message: String,
    #[serde(default)]
    pub error_context: Payload,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A macro snippet and what it is good for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroPattern {
    pub macro_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub code_snippet: String,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub parameters: Payload,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Any record the knowledge store can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeDocument {
    Operation(OperationRecord),
    Pattern(DesignPattern),
    ErrorSolution(ErrorSolution),
    MacroPattern(MacroPattern),
}

impl KnowledgeDocument {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Operation(_) => Collection::Operations,
            Self::Pattern(_) => Collection::Patterns,
            Self::ErrorSolution(_) => Collection::Errors,
            Self::MacroPattern(_) => Collection::Macros,
        }
    }

    /// Content-addressed ID. Equal inputs always map to the same document.
    pub fn id(&self) -> String {
        match self {
            Self::Operation(op) => document_id(&op.operation, &Value::Object(op.context.clone())),
            Self::Pattern(p) => document_id(&p.name, &json!({"type": p.pattern_type})),
            Self::ErrorSolution(e) => {
                document_id(&e.error_message, &Value::Object(e.error_context.clone()))
            }
            Self::MacroPattern(m) => document_id(&m.macro_name, &json!({"type": "vba"})),
        }
    }

    /// The text that gets embedded for similarity search.
    pub fn searchable_text(&self) -> String {
        match self {
            Self::Operation(op) => {
                let description = op
                    .context
                    .get("description")
                    .map(display_value)
                    .unwrap_or_default();
                format!("{} {} {}", op.operation, op.tags.join(" "), description)
            }
            Self::Pattern(p) => format!("{} {} {}", p.name, p.description, p.pattern_type),
            Self::ErrorSolution(e) => format!("{} {}", e.error_message, e.solution),
            Self::MacroPattern(m) => {
                format!("{} {} {}", m.macro_name, m.description, m.use_cases.join(" "))
            }
        }
    }

    /// Flatten into vector-store metadata.
    pub fn to_metadata(&self) -> Payload {
        let mut meta = Payload::new();
        match self {
            Self::Operation(op) => {
                meta.insert("operation".into(), json!(op.operation));
                meta.insert("context".into(), encoded(&op.context));
                meta.insert("result".into(), encoded(&op.result));
                meta.insert("success".into(), json!(op.success));
                meta.insert("tags".into(), encoded(&op.tags));
                meta.insert("timestamp".into(), json!(op.timestamp.to_rfc3339()));
            }
            Self::Pattern(p) => {
                meta.insert("name".into(), json!(p.name));
                meta.insert("description".into(), json!(p.description));
                meta.insert("pattern_type".into(), json!(p.pattern_type));
                meta.insert("implementation".into(), encoded(&p.implementation));
                meta.insert("examples".into(), encoded(&p.examples));
                meta.insert("timestamp".into(), json!(p.timestamp.to_rfc3339()));
            }
            Self::ErrorSolution(e) => {
                meta.insert("error_message".into(), json!(e.error_message));
                meta.insert("error_context".into(), encoded(&e.error_context));
                meta.insert("solution".into(), json!(e.solution));
                meta.insert("solution_steps".into(), encoded(&e.solution_steps));
                meta.insert("timestamp".into(), json!(e.timestamp.to_rfc3339()));
            }
            Self::MacroPattern(m) => {
                meta.insert("macro_name".into(), json!(m.macro_name));
                meta.insert("description".into(), json!(m.description));
                meta.insert("code_snippet".into(), json!(m.code_snippet));
                meta.insert("use_cases".into(), encoded(&m.use_cases));
                meta.insert("parameters".into(), encoded(&m.parameters));
                meta.insert("timestamp".into(), json!(m.timestamp.to_rfc3339()));
            }
        }
        meta
    }

    /// Rebuild a record from a stored document.
    ///
    /// Returns `None` (with a warning) when the primary text is missing.
    pub fn decode(collection: Collection, doc: &StoredDocument) -> Option<Self> {
        let fields = Fields { doc };
        let decoded = match collection {
            Collection::Operations => Self::Operation(OperationRecord {
                operation: fields.primary("operation")?,
                context: fields.nested("context"),
                result: fields.nested("result"),
                success: fields.flag("success"),
                tags: fields.nested("tags"),
                timestamp: fields.timestamp(),
            }),
            Collection::Patterns => Self::Pattern(DesignPattern {
                name: fields.primary("name")?,
                description: fields.text("description"),
                pattern_type: fields.text("pattern_type"),
                implementation: fields.nested("implementation"),
                examples: fields.nested("examples"),
                timestamp: fields.timestamp(),
            }),
            Collection::Errors => Self::ErrorSolution(ErrorSolution {
                error_message: fields.primary("error_message")?,
                error_context: fields.nested("error_context"),
                solution: fields.text("solution"),
                solution_steps: fields.nested("solution_steps"),
                timestamp: fields.timestamp(),
            }),
            Collection::Macros => Self::MacroPattern(MacroPattern {
                macro_name: fields.primary("macro_name")?,
                description: fields.text("description"),
                code_snippet: fields.text("code_snippet"),
                use_cases: fields.nested("use_cases"),
                parameters: fields.nested("parameters"),
                timestamp: fields.timestamp(),
            }),
        };
        Some(decoded)
    }
}

fn encoded<T: Serialize>(value: &T) -> Value {
    Value::String(serde_json::to_string(value).unwrap_or_else(|_| "null".into()))
}

/// Strings render bare, everything else as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Field-level reader over one stored document's metadata.
struct Fields<'a> {
    doc: &'a StoredDocument,
}

impl Fields<'_> {
    fn meta(&self) -> &Payload {
        &self.doc.metadata
    }

    fn primary(&self, field: &str) -> Option<String> {
        match self.meta().get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => {
                warn!(id = %self.doc.id, field, "Skipping knowledge document without primary text");
                None
            }
        }
    }

    fn text(&self, field: &str) -> String {
        self.meta().get(field).map(display_value).unwrap_or_default()
    }

    fn flag(&self, field: &str) -> bool {
        self.meta().get(field).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Decode a nested field stored either as a JSON string or as a plain
    /// JSON value. Malformed input yields the type's default.
    fn nested<T: DeserializeOwned + Default>(&self, field: &str) -> T {
        let parsed = match self.meta().get(field) {
            None | Some(Value::Null) => return T::default(),
            Some(Value::String(raw)) => serde_json::from_str(raw),
            Some(other) => serde_json::from_value(other.clone()),
        };
        parsed.unwrap_or_else(|e| {
            warn!(id = %self.doc.id, field, error = %e, "Malformed knowledge field, using default");
            T::default()
        })
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.meta()
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(self.doc.stored_at)
    }
}
