//! Date literal detection

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static DATE_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap());

/// Parse a string that is exactly `YYYY-MM-DDTHH:MM:SSZ`
///
/// Anything else, including fractional seconds, offsets or surrounding text,
/// is not a date literal.
pub fn parse_date_literal(value: &str) -> Option<DateTime<Utc>> {
    if !DATE_LITERAL.is_match(value) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Date value of a JSON node, `None` for non-strings and non-literals
pub fn revive(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(parse_date_literal)
}

/// Every date literal in `value`, keyed by JSON pointer
pub fn collect(value: &Value) -> BTreeMap<String, DateTime<Utc>> {
    let mut found = BTreeMap::new();
    walk(value, String::new(), &mut found);
    found
}

fn walk(value: &Value, pointer: String, found: &mut BTreeMap<String, DateTime<Utc>>) {
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                let token = name.replace('~', "~0").replace('/', "~1");
                walk(child, format!("{}/{}", pointer, token), found);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, format!("{}/{}", pointer, index), found);
            }
        }
        _ => {
            if let Some(date) = revive(value) {
                found.insert(pointer, date);
            }
        }
    }
}
