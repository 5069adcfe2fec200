//! Annotation projection, alias grouping and `$ref` unwrapping
//!
//! Records are walked at the top level and one level of nesting. Elements of a
//! top-level `value` array are treated as top-level records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::api::constants::{ALIAS_SEPARATOR, annotations};
use crate::api::error::WebApiError;

/// Marker stored in every alias group object
pub const ALIAS_TYPE_KEY: &str = "_type";
pub const ALIAS_TYPE_VALUE: &str = "alias";

const MAX_DEPTH: usize = 1;

static REFERENCE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(\w+)\(([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})\)")
        .unwrap()
});

/// Normalize a decoded response body
pub fn normalize(value: Value) -> Result<Value, WebApiError> {
    match value {
        Value::Object(map) => normalize_record(map, 0),
        other => Ok(other),
    }
}

/// True for `{"@odata.id": ...}` optionally accompanied by `@odata.context`
pub fn is_reference(map: &Map<String, Value>) -> bool {
    map.get(&format!("@{}", annotations::ID)).is_some_and(Value::is_string)
        && map
            .keys()
            .all(|k| k == &format!("@{}", annotations::ID) || k == &format!("@{}", annotations::CONTEXT))
}

/// Convert a reference body to `{oDataContext, key, collection}`
///
/// Returns `None` when the id is not a `collection(guid)` URL.
pub fn reference_to_record(map: &Map<String, Value>) -> Option<Value> {
    let id = map.get(&format!("@{}", annotations::ID))?.as_str()?;
    let captures = REFERENCE_ID.captures(id)?;

    let mut record = Map::new();
    if let Some(context) = map.get(&format!("@{}", annotations::CONTEXT)) {
        record.insert("oDataContext".to_string(), context.clone());
    }
    record.insert("key".to_string(), Value::String(captures[2].to_string()));
    record.insert("collection".to_string(), Value::String(captures[1].to_string()));
    Some(Value::Object(record))
}

fn normalize_record(map: Map<String, Value>, depth: usize) -> Result<Value, WebApiError> {
    if is_reference(&map) {
        if let Some(record) = reference_to_record(&map) {
            return Ok(record);
        }
    }

    let mut result = map.clone();

    for (key, value) in map {
        match value {
            Value::Object(nested) if depth < MAX_DEPTH => {
                result.insert(key.clone(), normalize_record(nested, depth + 1)?);
            }
            Value::Array(items) if depth < MAX_DEPTH || (depth == 0 && key == "value") => {
                let child_depth = if depth == 0 && key == "value" { 0 } else { depth + 1 };
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(nested) => normalize_record(nested, child_depth),
                        other => Ok(other),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                result.insert(key.clone(), Value::Array(items));
            }
            value => {
                if let Some((companion, companion_value)) = companion(&key, &value) {
                    if key.contains(ALIAS_SEPARATOR) {
                        group_alias(&mut result, &companion, companion_value.clone())?;
                    }
                    result.insert(companion, companion_value);
                }
                if key.contains(ALIAS_SEPARATOR) {
                    group_alias(&mut result, &key, value)?;
                }
            }
        }
    }

    Ok(Value::Object(result))
}

/// Derived key and value for an annotation key, if it is one we project
fn companion(key: &str, value: &Value) -> Option<(String, Value)> {
    let (field, annotation) = key.split_once('@')?;

    if field.is_empty() {
        let name = match annotation {
            annotations::CONTEXT => "oDataContext",
            annotations::NEXT_LINK => "oDataNextLink",
            annotations::DELTA_LINK => "oDataDeltaLink",
            annotations::COUNT => return Some(("oDataCount".to_string(), count_value(value))),
            _ => return None,
        };
        return Some((name.to_string(), value.clone()));
    }

    let suffix = match annotation {
        annotations::FORMATTED_VALUE => "Formatted",
        annotations::NAVIGATION_PROPERTY => "NavigationProperty",
        annotations::LOOKUP_LOGICAL_NAME => "LogicalName",
        _ => return None,
    };
    Some((format!("{}_{}", field, suffix), value.clone()))
}

fn count_value(value: &Value) -> Value {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

/// Copy `alias_x002e_field` into `result[alias][field]`
fn group_alias(result: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), WebApiError> {
    let mut segments = key.split(ALIAS_SEPARATOR);
    let (alias, field) = match (segments.next(), segments.next()) {
        (Some(alias), Some(field)) if !alias.is_empty() && !field.is_empty() => (alias, field),
        _ => return Ok(()),
    };

    let group = result.entry(alias.to_string()).or_insert_with(|| {
        let mut group = Map::new();
        group.insert(ALIAS_TYPE_KEY.to_string(), Value::String(ALIAS_TYPE_VALUE.to_string()));
        Value::Object(group)
    });

    let group = match group {
        Value::Object(group)
            if group.get(ALIAS_TYPE_KEY).and_then(Value::as_str) == Some(ALIAS_TYPE_VALUE) =>
        {
            group
        }
        _ => return Err(alias_collision(alias)),
    };

    match group.get(field) {
        Some(existing) if existing != &value => Err(alias_collision(alias)),
        _ => {
            group.insert(field.to_string(), value);
            Ok(())
        }
    }
}

fn alias_collision(alias: &str) -> WebApiError {
    WebApiError::response_format(format!(
        "alias name must be unique: '{}' collides with another property or alias field",
        alias
    ))
}
