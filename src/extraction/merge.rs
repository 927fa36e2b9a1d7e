//! Reply parsing and first-writer-wins merging of per-segment records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{DocumentClass, FieldKind};

/// Field-name to value map extracted from a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord(Map<String, Value>);

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.0.values_mut()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ExtractedRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Pull JSON objects out of a model reply.
///
/// Accepts a bare object, an array of objects, either wrapped in a code
/// fence, or the first JSON value embedded in surrounding prose. Returns
/// `None` when nothing object-shaped can be found.
pub fn parse_reply(reply: &str) -> Option<Vec<Map<String, Value>>> {
    let body = strip_fence(reply.trim());

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return objects_of(value);
    }

    // First '{' or '[' in the raw reply that starts a complete JSON value
    for (start, c) in reply.char_indices() {
        if c != '{' && c != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if let Some(objects) = objects_of(value) {
                return Some(objects);
            }
        }
    }
    None
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string ("json") on the opening line
    match rest.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => rest
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            .trim(),
    }
}

fn objects_of(value: Value) -> Option<Vec<Map<String, Value>>> {
    match value {
        Value::Object(map) => Some(vec![map]),
        Value::Array(items) => {
            let objects: Vec<Map<String, Value>> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            (!objects.is_empty()).then_some(objects)
        }
        _ => None,
    }
}

/// `null`, blank strings and empty containers never populate a field.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Coerce `value` to `kind` where the conversion is unambiguous.
fn coerce(value: Value, kind: FieldKind) -> Value {
    match (kind, value) {
        (FieldKind::Number, Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | ' '))
                .collect();
            cleaned
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::String(s), Value::Number)
        }
        (FieldKind::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_or(Value::String(s), |n| Value::Number(n.into())),
        (FieldKind::Integer, Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && n.as_i64().is_none() && n.as_u64().is_none() => {
                Value::Number((f as i64).into())
            }
            _ => Value::Number(n),
        },
        (FieldKind::String, Value::Number(n)) => Value::String(n.to_string()),
        (FieldKind::List, value @ (Value::Object(_) | Value::String(_))) => {
            Value::Array(vec![value])
        }
        (_, value) => value,
    }
}

/// Folds per-segment records into one, first writer wins.
#[derive(Debug)]
pub struct RecordMerger {
    class: DocumentClass,
    merged: ExtractedRecord,
}

impl RecordMerger {
    pub fn new(class: DocumentClass) -> Self {
        Self {
            class,
            merged: ExtractedRecord::new(),
        }
    }

    /// Merge one parsed object. Returns how many fields it newly filled.
    pub fn absorb(&mut self, object: Map<String, Value>) -> usize {
        let mut filled = 0;
        for (raw_key, value) in object {
            let key = normalize_key(&raw_key);
            if key.is_empty() || is_empty_value(&value) {
                continue;
            }

            let value = match self.class.field(&key) {
                Some(spec) => coerce(value, spec.kind),
                None if self.class == DocumentClass::Unknown => value,
                None => continue,
            };

            if self.merged.get(&key).is_none_or(is_empty_value) {
                self.merged.insert(key, value);
                filled += 1;
            }
        }
        filled
    }

    /// The merged record, or `None` when no field was ever filled.
    pub fn finish(self) -> Option<ExtractedRecord> {
        (!self.merged.is_empty()).then_some(self.merged)
    }
}
