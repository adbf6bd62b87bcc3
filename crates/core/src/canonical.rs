//! Canonical JSON fingerprints.
//!
//! Knowledge document IDs and context cache keys must not depend on the
//! order in which a caller happened to insert keys into a mapping, so both
//! go through [`canonical_json`].

use serde_json::{Map, Value};

/// Free-form structured payload: event data, operation context, prompt arguments.
pub type Payload = Map<String, Value>;

/// Return a copy of `value` with every object's keys sorted recursively.
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

/// Compact, key-sorted JSON serialization of `value`.
pub fn canonical_json(value: &Value) -> String {
    canonical_value(value).to_string()
}
