//! Template resolution: evaluate every placeholder against one language code.

use crate::mappings::template::{ResolveError, Template};
use serde_json::{Map, Value};

/// Resolve `template` for `code`.
///
/// Mappings drop keys whose value resolves to nothing, sequences drop such
/// elements and keep the order of the rest, and a placeholder's result is
/// itself resolved. Returns `Ok(None)` when the node as a whole is absent.
pub fn resolve(code: &str, template: &Template) -> Result<Option<Value>, ResolveError> {
    match template {
        Template::Scalar(value) => Ok(prune(value)),
        Template::Sequence(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                if let Some(value) = resolve(code, item)? {
                    resolved.push(value);
                }
            }
            Ok(Some(Value::Array(resolved)))
        }
        Template::Mapping(entries) => {
            let mut resolved = Map::new();
            for (key, value) in entries {
                if let Some(value) = resolve(code, value)? {
                    resolved.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(resolved)))
        }
        Template::Placeholder(f) => match f(code)? {
            Some(produced) => resolve(code, &produced),
            None => Ok(None),
        },
    }
}

/// Resolve a whole document. An absent root is an error.
pub fn resolve_document(code: &str, template: &Template) -> Result<Value, ResolveError> {
    resolve(code, template)?.ok_or_else(|| ResolveError::EmptyDocument {
        code: code.to_string(),
    })
}

/// Serialize a resolved document with 4-space indentation and sorted keys.
pub fn to_json_pretty(value: &Value) -> serde_json::Result<String> {
    use serde::Serialize;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    sort_keys(value).serialize(&mut serializer)?;
    // serde_json only ever writes valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// `Map` keeps insertion order when serde_json's `preserve_order` feature is
// enabled anywhere in the build, so order keys here.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        Value::Object(entries) => {
            let mut sorted: Vec<(&String, &Value)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect(),
            )
        }
        scalar => scalar.clone(),
    }
}

// Literal JSON embedded directly as a scalar still must not leak nulls.
fn prune(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(items.iter().filter_map(prune).collect())),
        Value::Object(entries) => Some(Value::Object(
            entries
                .iter()
                .filter_map(|(key, value)| prune(value).map(|value| (key.clone(), value)))
                .collect(),
        )),
        scalar => Some(scalar.clone()),
    }
}
