//! Request assembly
//!
//! Combines the query and header composers into one immutable
//! [`AssembledRequest`]. The same record is used for a standalone call and for
//! a batch member.

use std::borrow::Cow;
use std::collections::BTreeMap;

use log::debug;
use serde_json::{Value, json};

use super::operation::Operation;
use crate::api::constants::{CASE_SENSITIVE_COLLECTIONS, JSON_BODY_CONTENT_TYPE, MAX_PARTITION_ID_LENGTH, headers};
use crate::api::error::WebApiError;
use crate::api::headers::compose_headers;
use crate::api::models::Request;
use crate::api::query::compose;
use crate::api::response::ParseOptions;
use crate::api::validation;
use crate::config::ClientConfig;

/// Canonical request record, ready for the transport or the batch encoder
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRequest {
    pub operation: Operation,
    pub method: &'static str,
    /// Path and query relative to the Web API root, or `$n` for a batch reference
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub is_async: bool,
    /// User supplied Content-ID, without a leading `$`
    pub content_id: Option<String>,
    pub in_change_set: bool,
    pub parse: ParseOptions,
}

impl AssembledRequest {
    /// True when the path is a `$n` reference to an earlier batch member
    pub fn is_reference(&self) -> bool {
        self.path.starts_with('$')
    }
}

/// Assemble `request` for `operation`
///
/// `in_batch` allows requests without a collection that address an earlier
/// batch member by Content-ID.
pub fn assemble(
    operation: &Operation,
    request: &Request,
    config: &ClientConfig,
    in_batch: bool,
) -> Result<AssembledRequest, WebApiError> {
    let function_name = operation.operation_type();
    let reference = reference_id(request, in_batch);

    let base = match (&request.collection, &reference) {
        (Some(collection), _) => {
            let collection = collection_name(collection, function_name)?;
            match request.key.as_deref() {
                Some(key) => format!("{}({})", collection, record_key(key, function_name)?),
                None if operation.requires_key() => {
                    return Err(WebApiError::composition(format!(
                        "{} requires the request.key parameter",
                        function_name
                    )));
                }
                None => collection,
            }
        }
        (None, Some(content_id)) => format!("${}", content_id),
        (None, None) if operation.allows_unbound() => String::new(),
        (None, None) => {
            return Err(WebApiError::composition(format!(
                "{} requires the request.collection parameter to be a non-empty String",
                function_name
            )));
        }
    };

    if let Some(partition_id) = request.partition_id.as_deref() {
        validation::max_length_parameter(
            partition_id,
            MAX_PARTITION_ID_LENGTH,
            function_name,
            "request.partitionId",
        )?;
    }

    let request = adjust_for_operation(operation, request, function_name)?;
    let mut composed = compose(&base, &request);
    let mut parse = ParseOptions::default();
    let mut body = None;

    match operation {
        Operation::Count if request.filter.as_deref().is_some_and(|f| !f.is_empty()) => {
            parse.to_count = true;
        }
        Operation::Count => composed.push_segment("$count"),
        Operation::Associate {
            related_collection,
            related_key,
        } => {
            composed.push_segment("$ref");
            body = Some(json!({ "@odata.id": related_id(related_collection, related_key, config, function_name)? }));
        }
        Operation::Disassociate { .. } => composed.push_segment("$ref"),
        Operation::CallAction { action } => composed.push_segment(action),
        Operation::FetchXml => parse.page_number = Some(request.page_number.unwrap_or(1)),
        _ => {}
    }

    if operation.sends_body() {
        body = request.data.clone();
    }

    let mut headers = compose_headers(&request, config, function_name)?;
    let body = body
        .map(|value| encode_body(&value, function_name))
        .transpose()?;
    if body.is_some() && !has_header(&headers, headers::CONTENT_TYPE) {
        headers.insert(headers::CONTENT_TYPE.to_string(), JSON_BODY_CONTENT_TYPE.to_string());
    }

    let method = operation.http_method();
    let path = composed.to_path_and_query();
    debug!("Assembled {} {} for {}", method, path, function_name);

    Ok(AssembledRequest {
        operation: operation.clone(),
        method,
        path,
        headers,
        body,
        is_async: request.is_async,
        content_id: if reference.is_some() && request.collection.is_none() {
            None
        } else {
            request.content_id.as_deref().map(strip_reference_marker)
        },
        in_change_set: request.in_change_set.unwrap_or(true),
        parse,
    })
}

/// Lower-cased entity set name, unless it is one of the case-sensitive system collections
pub fn collection_name(collection: &str, function_name: &str) -> Result<String, WebApiError> {
    let collection = collection.trim();
    if collection.is_empty() {
        return Err(WebApiError::composition(format!(
            "{} requires the request.collection parameter to be a non-empty String",
            function_name
        )));
    }

    if CASE_SENSITIVE_COLLECTIONS.contains(&collection) {
        Ok(collection.to_string())
    } else {
        Ok(collection.to_lowercase())
    }
}

fn record_key(key: &str, function_name: &str) -> Result<String, WebApiError> {
    validation::key_parameter(key, function_name, "request.key").map_err(|e| WebApiError::composition(e.to_string()))
}

fn reference_id(request: &Request, in_batch: bool) -> Option<String> {
    if !in_batch {
        return None;
    }
    request
        .content_id
        .as_deref()
        .map(strip_reference_marker)
        .filter(|id| !id.is_empty())
}

fn strip_reference_marker(content_id: &str) -> String {
    content_id.trim().trim_start_matches('$').to_string()
}

/// Operation-specific facets folded into a copy of the descriptor
fn adjust_for_operation<'a>(
    operation: &Operation,
    request: &'a Request,
    function_name: &str,
) -> Result<Cow<'a, Request>, WebApiError> {
    match operation {
        Operation::Update if request.if_match.is_none() && request.if_none_match.is_none() => {
            let mut request = request.clone();
            request.if_match = Some("*".to_string());
            Ok(Cow::Owned(request))
        }
        Operation::Count if request.filter.as_deref().is_some_and(|f| !f.is_empty()) => {
            let mut request = request.clone();
            request.count = true;
            request.top = None;
            Ok(Cow::Owned(request))
        }
        Operation::Associate { .. } | Operation::Disassociate { .. } => {
            let navigation = request
                .navigation_property
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| {
                    WebApiError::composition(format!(
                        "{} requires the request.navigationProperty parameter",
                        function_name
                    ))
                })?;

            match operation {
                Operation::Disassociate {
                    related_key: Some(related_key),
                } => {
                    let mut request = request.clone();
                    request.navigation_property = Some(format!(
                        "{}({})",
                        navigation,
                        record_key(related_key, function_name)?
                    ));
                    Ok(Cow::Owned(request))
                }
                _ => Ok(Cow::Borrowed(request)),
            }
        }
        Operation::FetchXml if request.fetch_xml.as_deref().is_none_or(|x| x.trim().is_empty()) => {
            Err(WebApiError::usage(format!(
                "{} requires the request.fetchXml parameter to be of type String",
                function_name
            )))
        }
        _ => Ok(Cow::Borrowed(request)),
    }
}

/// `@odata.id` target of an association
fn related_id(
    related_collection: &str,
    related_key: &str,
    config: &ClientConfig,
    function_name: &str,
) -> Result<String, WebApiError> {
    let related_key = related_key.trim();
    if related_key.starts_with('$') {
        return Ok(related_key.to_string());
    }

    let collection = collection_name(related_collection, function_name)?;
    let key = record_key(related_key, function_name)?;
    Ok(format!("{}{}({})", config.web_api_url(), collection, key))
}

fn encode_body(value: &Value, function_name: &str) -> Result<String, WebApiError> {
    serde_json::to_string(value)
        .map_err(|e| WebApiError::composition(format!("{} cannot serialize request.data: {}", function_name, e)))
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}
