//! Function call segments with parameter aliases

use serde_json::Value;

use super::filters::encode_component;

/// Render `name(p1=@p1,...)` and the matching `@p1=value` query entries
///
/// Null parameters are skipped. Strings are single-quoted unless they are enum
/// literals (`Microsoft.Dynamics.CRM.*`) or alias references (`@...`).
pub fn render_function(name: &str, parameters: &[(String, Value)]) -> (String, Vec<String>) {
    let mut arguments = Vec::new();
    let mut aliases = Vec::new();

    for (parameter, value) in parameters {
        let literal = match value {
            Value::Null => continue,
            Value::String(s) if s.starts_with("Microsoft.Dynamics.CRM") || s.starts_with('@') => s.clone(),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            Value::Array(_) | Value::Object(_) => value.to_string(),
        };

        let alias = format!("@p{}", arguments.len() + 1);
        arguments.push(format!("{}={}", parameter, alias));
        aliases.push(format!("{}={}", alias, encode_component(&literal)));
    }

    (format!("{}({})", name, arguments.join(",")), aliases)
}
