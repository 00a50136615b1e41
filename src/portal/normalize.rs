//! Flattening of raw portal resource items into uniform records.
//!
//! The portal returns heterogeneous shapes per resource: ids wrapped in
//! `{"value": ...}`, an `attributes` map, a `fields` list of
//! `{attribute, value}` pairs, and assorted top-level scalars. One ordered
//! set of merge rules produces a flat record regardless of resource type;
//! later rules only fill gaps and never overwrite earlier results.

use serde_json::{Map, Value};

/// Flat field-name → value mapping produced from one raw item.
pub type NormalizedRecord = Map<String, Value>;

/// Top-level keys that are structural, not data, and are never copied as-is.
const RESERVED_KEYS: [&str; 7] = [
    "id",
    "type",
    "attributes",
    "fields",
    "relationships",
    "links",
    "meta",
];

/// Normalize one raw resource item. Non-objects are skipped; an item that
/// yields no fields at all is dropped.
pub fn normalize_item(raw: &Value) -> Option<NormalizedRecord> {
    let item = raw.as_object()?;
    let mut record = NormalizedRecord::new();

    // Rule 1: unwrap an id that is itself {"value": x}.
    if let Some(id) = item.get("id") {
        match id {
            Value::Object(wrapper) => {
                if let Some(value) = wrapper.get("value") {
                    record.insert("id".to_string(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                record.insert("id".to_string(), other.clone());
            }
        }
    }

    // Rule 2: copy the attributes map.
    if let Some(attributes) = item.get("attributes").and_then(Value::as_object) {
        for (key, value) in attributes {
            record.insert(key.clone(), value.clone());
        }
    }

    // Rule 3: fields entries fill gaps only.
    if let Some(fields) = item.get("fields").and_then(Value::as_array) {
        for field in fields {
            let Some(field) = field.as_object() else {
                continue;
            };
            let Some(attribute) = field.get("attribute").and_then(Value::as_str) else {
                continue;
            };
            if !record.contains_key(attribute) {
                record.insert(
                    attribute.to_string(),
                    field.get("value").cloned().unwrap_or(Value::Null),
                );
            }
        }
    }

    // Rule 4: remaining top-level keys outside the reserved set.
    for (key, value) in item {
        if RESERVED_KEYS.contains(&key.as_str()) || record.contains_key(key) {
            continue;
        }
        record.insert(key.clone(), value.clone());
    }

    if record.is_empty() {
        None
    } else {
        Some(record)
    }
}

/// Walk an aggregated envelope and normalize every item found under the
/// `resources` or `data` container (a lone `data` object counts as one item).
pub fn collect_records(envelope: &Value) -> Vec<NormalizedRecord> {
    let items: Vec<&Value> = if let Some(list) = envelope.get("resources").and_then(Value::as_array)
    {
        list.iter().collect()
    } else if let Some(list) = envelope.get("data").and_then(Value::as_array) {
        list.iter().collect()
    } else if let Some(single) = envelope.get("data").filter(|v| v.is_object()) {
        vec![single]
    } else {
        Vec::new()
    };

    items.into_iter().filter_map(normalize_item).collect()
}

/// Integer-coerced id of a normalized record, if it has one.
pub fn record_id(record: &NormalizedRecord) -> Option<i64> {
    match record.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
