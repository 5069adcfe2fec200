//! HTTP header composition
//!
//! Builds the header set for one request from its descriptor and the client
//! configuration. Custom request headers are applied last and win on collision.

pub mod prefer;

use std::collections::BTreeMap;

use crate::api::constants::headers;
use crate::api::error::WebApiError;
use crate::api::models::Request;
use crate::api::validation;
use crate::config::ClientConfig;

pub use prefer::PreferOptions;

/// Collect the Prefer options from the raw string, the discrete fields and the client defaults
pub fn prefer_options(request: &Request, config: &ClientConfig) -> PreferOptions {
    let raw = request
        .prefer
        .as_deref()
        .map(PreferOptions::parse)
        .unwrap_or_default();

    let include_annotations = request
        .include_annotations
        .clone()
        .filter(|a| !a.is_empty())
        .or(raw.include_annotations)
        .or_else(|| config.include_annotations.clone().filter(|a| !a.is_empty()));

    let max_page_size = request
        .max_page_size
        .filter(|n| *n > 0)
        .or(raw.max_page_size)
        .or(config.max_page_size.filter(|n| *n > 0));

    PreferOptions {
        return_representation: request
            .return_representation
            .unwrap_or(raw.return_representation || config.return_representation),
        include_annotations,
        max_page_size,
        track_changes: request.track_changes || raw.track_changes,
        continue_on_error: request.continue_on_error || raw.continue_on_error,
    }
}

/// Compose all headers for `request`
///
/// Fails when both `if_match` and `if_none_match` are set, or when an
/// impersonation id is not a GUID.
pub fn compose_headers(
    request: &Request,
    config: &ClientConfig,
    function_name: &str,
) -> Result<BTreeMap<String, String>, WebApiError> {
    let mut result = BTreeMap::new();

    if let Some(prefer) = prefer_options(request, config).render() {
        result.insert(headers::PREFER.to_string(), prefer);
    }

    if request.merge_labels {
        result.insert(headers::MERGE_LABELS.to_string(), "true".to_string());
    }

    let if_match = request.if_match.as_deref().filter(|v| !v.is_empty());
    let if_none_match = request.if_none_match.as_deref().filter(|v| !v.is_empty());
    if if_match.is_some() && if_none_match.is_some() {
        return Err(WebApiError::usage(format!(
            "{} cannot use both request.ifmatch and request.ifnonematch at the same time",
            function_name
        )));
    }
    if let Some(value) = if_match {
        result.insert(headers::IF_MATCH.to_string(), value.to_string());
    }
    if let Some(value) = if_none_match {
        result.insert(headers::IF_NONE_MATCH.to_string(), value.to_string());
    }

    let impersonate = request
        .impersonate
        .as_deref()
        .or(config.impersonate.as_deref())
        .filter(|v| !v.is_empty());
    if let Some(user) = impersonate {
        let user = validation::guid_parameter(user, function_name, "request.impersonate")?;
        result.insert(headers::CALLER_ID.to_string(), user);
    }

    let impersonate_aad = request
        .impersonate_aad
        .as_deref()
        .or(config.impersonate_aad.as_deref())
        .filter(|v| !v.is_empty());
    if let Some(object_id) = impersonate_aad {
        let object_id = validation::guid_parameter(object_id, function_name, "request.impersonateAAD")?;
        result.insert(headers::CALLER_OBJECT_ID.to_string(), object_id);
    }

    if request.duplicate_detection {
        result.insert(headers::SUPPRESS_DUPLICATE_DETECTION.to_string(), "false".to_string());
    }

    if request.bypass_custom_plugin_execution {
        result.insert(headers::BYPASS_CUSTOM_PLUGIN_EXECUTION.to_string(), "true".to_string());
    }

    for (name, value) in config.bypass.headers() {
        result.insert(name.to_string(), value);
    }

    for (name, value) in &request.headers {
        result.insert(name.clone(), value.clone());
    }

    Ok(result)
}
