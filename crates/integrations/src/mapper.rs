//! Declarative field projection between the two systems' record shapes
//!
//! A mapping is a flat dictionary from source path to destination path. A
//! source path is either a bare key or `parent.child` addressing one level
//! of nesting in the input; destination paths may also be dotted, in which
//! case intermediate objects are created. Keys without a mapping entry are
//! dropped (projection, not copy). The inverse direction is the same
//! projection run over the inverted dictionary.
//!
//! The identity field is projected like any other but its value is replaced
//! by the prefixed cross-system id, so the prefix convention stays out of
//! the mapping table itself.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::AtsConfig;

/// Source path -> destination path
pub type Mapping = HashMap<String, String>;

/// Project a record through a mapping.
///
/// Only one level of input nesting is supported; deeper structure is not
/// projected.
pub fn project(mapping: &Mapping, record: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in record {
        match value {
            Value::Object(nested) => {
                for (child, child_value) in nested {
                    if let Some(dest) = mapping.get(&format!("{key}.{child}")) {
                        set_path(&mut out, dest, child_value.clone());
                    }
                }
            }
            _ => {
                if let Some(dest) = mapping.get(key) {
                    set_path(&mut out, dest, value.clone());
                }
            }
        }
    }
    out
}

/// Swap keys and values, yielding the reverse-direction mapping
pub fn invert(mapping: &Mapping) -> Mapping {
    mapping.iter().map(|(k, v)| (v.clone(), k.clone())).collect()
}

/// Map a source candidate to a target worker payload, applying the
/// id-prefix convention to the identity field.
pub fn candidate_to_worker(ats: &AtsConfig, candidate: &Map<String, Value>) -> Map<String, Value> {
    let mapping = &ats.mappings.candidate_to_worker;
    let mut mapped = project(mapping, candidate);
    if let (Some(dest), Some(id)) = (mapping.get("id"), candidate.get("id")) {
        mapped.insert(
            dest.clone(),
            Value::String(format!("{}{}", ats.worker_prefix, plain_string(id))),
        );
    }
    mapped
}

/// Map a target worker back to a source candidate payload, stripping the
/// id prefix from the identity field.
pub fn worker_to_candidate(ats: &AtsConfig, worker: &Map<String, Value>) -> Map<String, Value> {
    let inverse = invert(&ats.mappings.candidate_to_worker);
    let mut mapped = project(&inverse, worker);
    if let Some(Value::String(id)) = mapped.get("id") {
        let stripped = ats.strip_worker_prefix(id).to_string();
        mapped.insert("id".to_string(), Value::String(stripped));
    }
    mapped
}

/// Write a value at a dot-separated path, creating intermediate objects
fn set_path(out: &mut Map<String, Value>, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = out;
    for part in &parts[..parts.len() - 1] {
        let slot = current
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot
            .as_object_mut()
            .expect("slot was just made an object");
    }
    current.insert(parts[parts.len() - 1].to_string(), value);
}

/// A scalar rendered without JSON quoting (numbers stay bare, strings
/// lose their quotes)
pub(crate) fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
