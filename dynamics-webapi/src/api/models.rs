//! Request descriptors
//!
//! [`Request`] is the option-rich description of one Web API call. It can be
//! built fluently in code or ingested from loosely typed JSON through
//! [`Request::from_value`], which is where the parameter validator guards every
//! facet.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use super::constants::MAX_PARTITION_ID_LENGTH;
use super::error::WebApiError;
use super::transport::AbortSignal;
use super::validation;

/// One `$expand` entry. Nested expands are not supported (one level only).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expand {
    pub property: String,
    pub select: Vec<String>,
    pub filter: Option<String>,
    pub order_by: Vec<String>,
    pub top: Option<u32>,
}

impl Expand {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order_by<I, S>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = clauses.into_iter().map(Into::into).collect();
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }
}

/// Description of a single Web API request
#[derive(Debug, Clone)]
pub struct Request {
    // Addressing
    pub collection: Option<String>,
    /// GUID (braces allowed) or alternate key expression
    pub key: Option<String>,
    pub property: Option<String>,
    pub field_name: Option<String>,
    pub navigation_property: Option<String>,

    // Query facets
    pub select: Vec<String>,
    pub expand: Vec<Expand>,
    pub filter: Option<String>,
    pub order_by: Vec<String>,
    pub top: Option<u32>,
    pub count: bool,
    pub saved_query: Option<String>,
    pub user_query: Option<String>,
    pub fetch_xml: Option<String>,
    /// Page the current FetchXml request asks for; used as the fallback page when no cookie comes back
    pub page_number: Option<u32>,
    pub function_name: Option<String>,
    pub function_parameters: Vec<(String, Value)>,
    pub partition_id: Option<String>,
    /// Raw `key=value` entries appended verbatim
    pub query_params: Vec<String>,

    // Preference facets
    pub return_representation: Option<bool>,
    pub include_annotations: Option<String>,
    pub max_page_size: Option<u32>,
    pub merge_labels: bool,
    pub duplicate_detection: bool,
    pub bypass_custom_plugin_execution: bool,
    pub continue_on_error: bool,
    pub track_changes: bool,
    /// Raw Prefer header value, normalized through the same renderer as the discrete fields
    pub prefer: Option<String>,

    // Concurrency
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,

    // Identity
    pub impersonate: Option<String>,
    pub impersonate_aad: Option<String>,

    /// Custom headers, applied over computed ones
    pub headers: BTreeMap<String, String>,

    // Batch facets
    pub content_id: Option<String>,
    /// `Some(false)` forces a standalone batch part
    pub in_change_set: Option<bool>,

    pub signal: Option<AbortSignal>,
    pub timeout: Option<Duration>,
    pub is_async: bool,

    /// JSON payload for create/update/upsert/action calls
    pub data: Option<Value>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            collection: None,
            key: None,
            property: None,
            field_name: None,
            navigation_property: None,
            select: Vec::new(),
            expand: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            top: None,
            count: false,
            saved_query: None,
            user_query: None,
            fetch_xml: None,
            page_number: None,
            function_name: None,
            function_parameters: Vec::new(),
            partition_id: None,
            query_params: Vec::new(),
            return_representation: None,
            include_annotations: None,
            max_page_size: None,
            merge_labels: false,
            duplicate_detection: false,
            bypass_custom_plugin_execution: false,
            continue_on_error: false,
            track_changes: false,
            prefer: None,
            if_match: None,
            if_none_match: None,
            impersonate: None,
            impersonate_aad: None,
            headers: BTreeMap::new(),
            content_id: None,
            in_change_set: None,
            signal: None,
            timeout: None,
            is_async: true,
            data: None,
        }
    }
}

impl Request {
    /// Start a request against a collection (entity set name)
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    /// Request addressing an entity created earlier in the same batch (`$<content-id>`)
    pub fn reference(content_id: impl Into<String>) -> Self {
        Self {
            content_id: Some(content_id.into()),
            ..Default::default()
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn expand(mut self, expand: Expand) -> Self {
        self.expand.push(expand);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order_by<I, S>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = clauses.into_iter().map(Into::into).collect();
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn navigation_property(mut self, property: impl Into<String>) -> Self {
        self.navigation_property = Some(property.into());
        self
    }

    pub fn function(mut self, name: impl Into<String>, parameters: Vec<(String, Value)>) -> Self {
        self.function_name = Some(name.into());
        self.function_parameters = parameters;
        self
    }

    pub fn fetch_xml(mut self, fetch_xml: impl Into<String>) -> Self {
        self.fetch_xml = Some(fetch_xml.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn in_change_set(mut self, in_change_set: bool) -> Self {
        self.in_change_set = Some(in_change_set);
        self
    }

    pub fn return_representation(mut self, enabled: bool) -> Self {
        self.return_representation = Some(enabled);
        self
    }

    pub fn include_annotations(mut self, annotations: impl Into<String>) -> Self {
        self.include_annotations = Some(annotations.into());
        self
    }

    pub fn impersonate(mut self, user_id: impl Into<String>) -> Self {
        self.impersonate = Some(user_id.into());
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a request from loosely typed JSON, validating every facet
    ///
    /// Keys use the wire-style camelCase names (`orderBy`, `maxPageSize`,
    /// `ifmatch`, `impersonateAAD`, ...). Unknown keys are ignored.
    pub fn from_value(function_name: &str, value: &Value) -> Result<Self, WebApiError> {
        let object = value.as_object().ok_or_else(|| {
            WebApiError::usage(format!("{} requires the request parameter to be an object", function_name))
        })?;

        let param = |name: &str| format!("request.{}", name);
        let mut request = Request::default();

        for (name, value) in object {
            if value.is_null() {
                continue;
            }
            let parameter = param(name.as_str());
            let parameter = parameter.as_str();

            match name.as_str() {
                "collection" => {
                    if !value.is_string() {
                        return Err(WebApiError::composition(format!(
                            "{} requires the {} parameter to be of type String",
                            function_name, parameter
                        )));
                    }
                    request.collection = as_string(value);
                }
                "key" | "id" => {
                    validation::string_parameter(value, function_name, parameter)?;
                    let key = as_string(value).unwrap_or_default();
                    request.key = Some(validation::key_parameter(&key, function_name, parameter)?);
                }
                "property" => request.property = string_field(value, function_name, parameter)?,
                "fieldName" => request.field_name = string_field(value, function_name, parameter)?,
                "navigationProperty" => {
                    request.navigation_property = string_field(value, function_name, parameter)?
                }
                "select" => request.select = string_array(value, function_name, parameter)?,
                "expand" => {
                    validation::string_or_array_parameter(value, function_name, parameter)?;
                    request.expand = match value {
                        Value::String(raw) => vec![Expand::new(raw.clone())],
                        _ => expand_array(value, function_name, parameter)?,
                    };
                }
                "filter" => request.filter = string_field(value, function_name, parameter)?,
                "orderBy" => request.order_by = string_array(value, function_name, parameter)?,
                "top" => request.top = Some(number_field(value, function_name, parameter)?),
                "count" => request.count = bool_field(value, function_name, parameter)?,
                "savedQuery" => {
                    let id = string_field(value, function_name, parameter)?.unwrap_or_default();
                    request.saved_query = Some(validation::guid_parameter(&id, function_name, parameter)?);
                }
                "userQuery" => {
                    let id = string_field(value, function_name, parameter)?.unwrap_or_default();
                    request.user_query = Some(validation::guid_parameter(&id, function_name, parameter)?);
                }
                "fetchXml" => request.fetch_xml = string_field(value, function_name, parameter)?,
                "pageNumber" => request.page_number = Some(number_field(value, function_name, parameter)?),
                "functionName" => request.function_name = string_field(value, function_name, parameter)?,
                "parameters" => {
                    let parameters = value.as_object().ok_or_else(|| {
                        WebApiError::usage(format!(
                            "{} requires the {} parameter to be an object",
                            function_name, parameter
                        ))
                    })?;
                    request.function_parameters =
                        parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                }
                "partitionId" => {
                    let id = string_field(value, function_name, parameter)?.unwrap_or_default();
                    validation::max_length_parameter(&id, MAX_PARTITION_ID_LENGTH, function_name, parameter)?;
                    request.partition_id = Some(id);
                }
                "queryParams" => request.query_params = string_array(value, function_name, parameter)?,
                "returnRepresentation" => {
                    request.return_representation = Some(bool_field(value, function_name, parameter)?)
                }
                "includeAnnotations" => {
                    request.include_annotations = string_field(value, function_name, parameter)?
                }
                "maxPageSize" => {
                    request.max_page_size = Some(number_field(value, function_name, parameter)?)
                }
                "mergeLabels" => request.merge_labels = bool_field(value, function_name, parameter)?,
                "duplicateDetection" => {
                    request.duplicate_detection = bool_field(value, function_name, parameter)?
                }
                "bypassCustomPluginExecution" => {
                    request.bypass_custom_plugin_execution = bool_field(value, function_name, parameter)?
                }
                "continueOnError" => request.continue_on_error = bool_field(value, function_name, parameter)?,
                "trackChanges" => request.track_changes = bool_field(value, function_name, parameter)?,
                "prefer" => {
                    validation::string_or_array_parameter(value, function_name, parameter)?;
                    request.prefer = match value {
                        Value::Array(items) => Some(
                            items
                                .iter()
                                .filter_map(|item| item.as_str())
                                .collect::<Vec<_>>()
                                .join(","),
                        ),
                        _ => as_string(value),
                    };
                }
                "ifmatch" => request.if_match = string_field(value, function_name, parameter)?,
                "ifnonematch" => request.if_none_match = string_field(value, function_name, parameter)?,
                "impersonate" => {
                    let id = string_field(value, function_name, parameter)?.unwrap_or_default();
                    request.impersonate = Some(validation::guid_parameter(&id, function_name, parameter)?);
                }
                "impersonateAAD" => {
                    let id = string_field(value, function_name, parameter)?.unwrap_or_default();
                    request.impersonate_aad = Some(validation::guid_parameter(&id, function_name, parameter)?);
                }
                "headers" => {
                    let headers = value.as_object().ok_or_else(|| {
                        WebApiError::usage(format!(
                            "{} requires the {} parameter to be an object",
                            function_name, parameter
                        ))
                    })?;
                    for (header, header_value) in headers {
                        let header_param = format!("{}.{}", parameter, header);
                        validation::string_parameter(header_value, function_name, &header_param)?;
                        request
                            .headers
                            .insert(header.clone(), as_string(header_value).unwrap_or_default());
                    }
                }
                "contentId" => {
                    request.content_id = match value {
                        Value::Number(n) => Some(n.to_string()),
                        _ => string_field(value, function_name, parameter)?,
                    }
                }
                "inChangeSet" => request.in_change_set = Some(bool_field(value, function_name, parameter)?),
                "timeout" => {
                    let ms: u32 = number_field(value, function_name, parameter)?;
                    request.timeout = Some(Duration::from_millis(u64::from(ms)));
                }
                "async" => {
                    request.is_async = value.as_bool().ok_or_else(|| {
                        WebApiError::composition(format!(
                            "{} requires the {} parameter to be of type Boolean",
                            function_name, parameter
                        ))
                    })?;
                }
                "data" => request.data = Some(value.clone()),
                _ => {}
            }
        }

        Ok(request)
    }
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn string_field(value: &Value, function_name: &str, parameter: &str) -> Result<Option<String>, WebApiError> {
    validation::string_parameter(value, function_name, parameter)?;
    Ok(as_string(value))
}

fn bool_field(value: &Value, function_name: &str, parameter: &str) -> Result<bool, WebApiError> {
    validation::bool_parameter(value, function_name, parameter)?;
    Ok(value.as_bool().unwrap_or_default())
}

fn number_field(value: &Value, function_name: &str, parameter: &str) -> Result<u32, WebApiError> {
    validation::number_parameter(value, function_name, parameter)?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
        .ok_or_else(|| validation::type_error(function_name, parameter, validation::ExpectedType::Number))
}

fn string_array(value: &Value, function_name: &str, parameter: &str) -> Result<Vec<String>, WebApiError> {
    validation::array_parameter(value, function_name, parameter)?;
    let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_param = format!("{}[{}]", parameter, i);
            string_field(item, function_name, &item_param).map(Option::unwrap_or_default)
        })
        .collect()
}

fn expand_array(value: &Value, function_name: &str, parameter: &str) -> Result<Vec<Expand>, WebApiError> {
    let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
    let mut expands = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let item_param = format!("{}[{}]", parameter, i);
        let object = item.as_object().ok_or_else(|| {
            WebApiError::usage(format!(
                "{} requires the {} parameter to be an object",
                function_name, item_param
            ))
        })?;

        let mut expand = Expand::default();
        for (name, value) in object {
            if value.is_null() {
                continue;
            }
            let field_param = format!("{}.{}", item_param, name);
            match name.as_str() {
                "property" => expand.property = string_field(value, function_name, &field_param)?.unwrap_or_default(),
                "select" => expand.select = string_array(value, function_name, &field_param)?,
                "filter" => expand.filter = string_field(value, function_name, &field_param)?,
                "orderBy" => expand.order_by = string_array(value, function_name, &field_param)?,
                "top" => expand.top = Some(number_field(value, function_name, &field_param)?),
                _ => {}
            }
        }
        expands.push(expand);
    }

    Ok(expands)
}
