//! Parameter guards for public entry points
//!
//! Every check returns `Ok` on success and a [`WebApiError::Usage`] naming the
//! calling function, the parameter and the expected type on failure. They run
//! before any request is composed, so a rejected call never touches the network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::error::WebApiError;

static GUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

static ALTERNATE_KEY_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+=(.+)$").unwrap());

/// Type labels used in usage error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    String,
    Number,
    Boolean,
    Array,
    StringOrArray,
    Guid,
    GuidOrAlternateKey,
}

impl ExpectedType {
    pub fn label(&self) -> &'static str {
        match self {
            ExpectedType::String => "String",
            ExpectedType::Number => "Number",
            ExpectedType::Boolean => "Boolean",
            ExpectedType::Array => "Array",
            ExpectedType::StringOrArray => "String or Array",
            ExpectedType::Guid => "GUID String",
            ExpectedType::GuidOrAlternateKey => "String representing GUID or Alternate Key",
        }
    }
}

/// Build the usage error for a parameter of the wrong type
pub fn type_error(function_name: &str, parameter_name: &str, expected: ExpectedType) -> WebApiError {
    WebApiError::usage(format!(
        "{} requires the {} parameter to be of type {}",
        function_name,
        parameter_name,
        expected.label()
    ))
}

pub fn string_parameter(value: &Value, function_name: &str, parameter_name: &str) -> Result<(), WebApiError> {
    match value {
        Value::String(_) => Ok(()),
        _ => Err(type_error(function_name, parameter_name, ExpectedType::String)),
    }
}

/// Accepts JSON numbers and strings that parse as a number
pub fn number_parameter(value: &Value, function_name: &str, parameter_name: &str) -> Result<(), WebApiError> {
    let numeric = match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    };

    if numeric {
        Ok(())
    } else {
        Err(type_error(function_name, parameter_name, ExpectedType::Number))
    }
}

pub fn bool_parameter(value: &Value, function_name: &str, parameter_name: &str) -> Result<(), WebApiError> {
    match value {
        Value::Bool(_) => Ok(()),
        _ => Err(type_error(function_name, parameter_name, ExpectedType::Boolean)),
    }
}

pub fn array_parameter(value: &Value, function_name: &str, parameter_name: &str) -> Result<(), WebApiError> {
    match value {
        Value::Array(_) => Ok(()),
        _ => Err(type_error(function_name, parameter_name, ExpectedType::Array)),
    }
}

pub fn string_or_array_parameter(
    value: &Value,
    function_name: &str,
    parameter_name: &str,
) -> Result<(), WebApiError> {
    match value {
        Value::String(_) | Value::Array(_) => Ok(()),
        _ => Err(type_error(function_name, parameter_name, ExpectedType::StringOrArray)),
    }
}

/// Strip one layer of braces and return the bare GUID
pub fn guid_parameter(value: &str, function_name: &str, parameter_name: &str) -> Result<String, WebApiError> {
    let bare = strip_braces(value);
    if GUID_PATTERN.is_match(bare) {
        Ok(bare.to_string())
    } else {
        Err(type_error(function_name, parameter_name, ExpectedType::Guid))
    }
}

/// Accept a GUID (braces optional) or an alternate key `field=value[,field2=value2]`
///
/// Double quotes in alternate keys are rewritten to single quotes and whitespace
/// around the commas is dropped.
pub fn key_parameter(value: &str, function_name: &str, parameter_name: &str) -> Result<String, WebApiError> {
    let bare = strip_braces(value.trim());
    if GUID_PATTERN.is_match(bare) {
        return Ok(bare.to_string());
    }

    let mut pairs = Vec::new();
    for pair in value.split(',') {
        let pair = pair.trim().replace('"', "'");
        if !ALTERNATE_KEY_PAIR.is_match(&pair) {
            return Err(type_error(function_name, parameter_name, ExpectedType::GuidOrAlternateKey));
        }
        pairs.push(pair);
    }

    Ok(pairs.join(","))
}

/// Fails only when the value is non-empty and longer than `max_length`
pub fn max_length_parameter(
    value: &str,
    max_length: usize,
    function_name: &str,
    parameter_name: &str,
) -> Result<(), WebApiError> {
    if !value.is_empty() && value.chars().count() > max_length {
        return Err(WebApiError::usage(format!(
            "{} requires the {} parameter to be at most {} characters long",
            function_name, parameter_name, max_length
        )));
    }
    Ok(())
}

/// Error for any batch call made while no batch queue is open
pub fn batch_not_started(function_name: &str) -> WebApiError {
    WebApiError::usage(format!(
        "{} can only be used inside a batch: call start_batch() first, queue the requests, then execute_batch()",
        function_name
    ))
}

/// True for a bare 36-character hyphenated GUID
pub fn is_guid(value: &str) -> bool {
    GUID_PATTERN.is_match(value)
}

fn strip_braces(value: &str) -> &str {
    value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(err: WebApiError) -> String {
        match err {
            WebApiError::Usage { message } => message,
            other => panic!("expected usage error, got {:?}", other),
        }
    }

    #[test]
    fn test_type_checks() {
        assert!(string_parameter(&json!("accounts"), "retrieve", "request.collection").is_ok());
        assert!(bool_parameter(&json!(true), "retrieve", "request.count").is_ok());
        assert!(array_parameter(&json!(["a"]), "retrieve", "request.select").is_ok());
        assert!(string_or_array_parameter(&json!("a"), "retrieve", "request.expand").is_ok());

        let err = string_parameter(&json!(5), "retrieve", "request.collection").unwrap_err();
        assert_eq!(
            message(err),
            "retrieve requires the request.collection parameter to be of type String"
        );

        let err = string_or_array_parameter(&json!(5), "retrieve", "request.expand").unwrap_err();
        assert!(message(err).ends_with("to be of type String or Array"));
    }

    #[test]
    fn test_number_accepts_numeric_strings() {
        assert!(number_parameter(&json!(10), "retrieve_multiple", "request.top").is_ok());
        assert!(number_parameter(&json!("10"), "retrieve_multiple", "request.top").is_ok());
        assert!(number_parameter(&json!("ten"), "retrieve_multiple", "request.top").is_err());
        assert!(number_parameter(&json!(true), "retrieve_multiple", "request.top").is_err());
    }

    #[test]
    fn test_guid_strips_one_layer_of_braces() {
        let guid = "00000000-0000-0000-0000-000000000001";
        assert_eq!(guid_parameter(guid, "f", "p").unwrap(), guid);
        assert_eq!(guid_parameter(&format!("{{{}}}", guid), "f", "p").unwrap(), guid);
        assert!(guid_parameter(&format!("{{{{{}}}}}", guid), "f", "p").is_err());

        let err = guid_parameter("not-a-guid", "update", "request.impersonate").unwrap_err();
        assert_eq!(
            message(err),
            "update requires the request.impersonate parameter to be of type GUID String"
        );
    }

    #[test]
    fn test_alternate_keys() {
        assert_eq!(key_parameter("name='x'", "f", "p").unwrap(), "name='x'");
        assert_eq!(
            key_parameter("name=\"x\" ,  code='y'", "f", "p").unwrap(),
            "name='x',code='y'"
        );
        assert_eq!(
            key_parameter("{00000000-0000-0000-0000-000000000001}", "f", "p").unwrap(),
            "00000000-0000-0000-0000-000000000001"
        );

        let err = key_parameter("name=", "retrieve", "request.key").unwrap_err();
        assert_eq!(
            message(err),
            "retrieve requires the request.key parameter to be of type String representing GUID or Alternate Key"
        );
        assert!(key_parameter("justtext", "f", "p").is_err());
    }

    #[test]
    fn test_max_length() {
        assert!(max_length_parameter("", 3, "f", "p").is_ok());
        assert!(max_length_parameter("abc", 3, "f", "p").is_ok());
        let err = max_length_parameter("abcd", 3, "create", "request.partitionId").unwrap_err();
        assert!(message(err).contains("at most 3 characters"));
    }

    #[test]
    fn test_batch_not_started_names_lifecycle() {
        let msg = message(batch_not_started("enqueue"));
        assert!(msg.starts_with("enqueue"));
        assert!(msg.contains("start_batch()"));
        assert!(msg.contains("execute_batch()"));
    }
}
