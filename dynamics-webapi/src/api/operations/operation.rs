//! Operation catalogue for Web API calls

use std::collections::BTreeMap;

use serde_json::Value;

use crate::api::error::WebApiError;
use crate::api::response::parser::entity_id_from_headers;

/// A single kind of call that can be made against the Web API
///
/// The addressing and query facets live on [`Request`](crate::api::models::Request);
/// the operation only decides the HTTP method and the path suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// GET one record by key
    Retrieve,
    /// GET a collection (optionally filtered, paged, expanded)
    RetrieveMultiple,
    /// GET `collection/$count`, or `$count=true` when a filter is present
    Count,
    /// POST a new record
    Create,
    /// PATCH an existing record; never creates
    Update,
    /// PATCH that creates the record when it does not exist
    Upsert,
    Delete,
    /// POST `collection(key)/nav/$ref`
    Associate {
        /// Entity set of the related record. Empty when `related_key` is a `$n` batch reference.
        related_collection: String,
        related_key: String,
    },
    /// DELETE `collection(key)/nav(related)/$ref` or `collection(key)/nav/$ref`
    Disassociate { related_key: Option<String> },
    /// GET a bound or unbound function
    CallFunction,
    /// POST a bound or unbound action
    CallAction { action: String },
    /// GET `collection?fetchXml=...`
    FetchXml,
}

impl Operation {
    pub fn associate(related_collection: impl Into<String>, related_key: impl Into<String>) -> Self {
        Self::Associate {
            related_collection: related_collection.into(),
            related_key: related_key.into(),
        }
    }

    pub fn disassociate(related_key: Option<String>) -> Self {
        Self::Disassociate { related_key }
    }

    pub fn call_action(action: impl Into<String>) -> Self {
        Self::CallAction {
            action: action.into(),
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Retrieve | Self::RetrieveMultiple | Self::Count | Self::CallFunction | Self::FetchXml => "GET",
            Self::Create | Self::Associate { .. } | Self::CallAction { .. } => "POST",
            Self::Update | Self::Upsert => "PATCH",
            Self::Delete | Self::Disassociate { .. } => "DELETE",
        }
    }

    /// Name used in validation and composition error messages
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Retrieve => "retrieve",
            Self::RetrieveMultiple => "retrieve_multiple",
            Self::Count => "count",
            Self::Create => "create",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Associate { .. } => "associate",
            Self::Disassociate { .. } => "disassociate",
            Self::CallFunction => "call_function",
            Self::CallAction { .. } => "call_action",
            Self::FetchXml => "fetch_xml",
        }
    }

    /// Operations addressing a single record
    pub fn requires_key(&self) -> bool {
        matches!(
            self,
            Self::Retrieve
                | Self::Update
                | Self::Upsert
                | Self::Delete
                | Self::Associate { .. }
                | Self::Disassociate { .. }
        )
    }

    /// Functions and actions may be unbound and have no collection
    pub fn allows_unbound(&self) -> bool {
        matches!(self, Self::CallFunction | Self::CallAction { .. })
    }

    /// Operations whose payload comes from `Request::data`
    pub fn sends_body(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Upsert | Self::CallAction { .. }
        )
    }
}

/// Outcome of one queued operation after a batch executes
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub operation: Operation,
    pub success: bool,
    /// Normalized body; `None` for no-content answers
    pub data: Option<Value>,
    pub error: Option<WebApiError>,
    pub status_code: Option<u16>,
    /// Part headers, lower-cased (e.g. `odata-entityid`)
    pub headers: BTreeMap<String, String>,
}

impl OperationResult {
    pub fn success(
        operation: Operation,
        status_code: u16,
        headers: BTreeMap<String, String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            operation,
            success: true,
            data,
            error: None,
            status_code: Some(status_code),
            headers,
        }
    }

    pub fn error(operation: Operation, error: WebApiError) -> Self {
        Self {
            operation,
            success: false,
            data: None,
            status_code: error.status(),
            error: Some(error),
            headers: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_error(&self) -> bool {
        !self.success
    }

    /// Id of a created record, taken from the `OData-EntityId` part header
    pub fn entity_id(&self) -> Option<String> {
        entity_id_from_headers(&self.headers)
    }

    /// Get the result data, returning the error if the operation failed
    pub fn into_result(self) -> Result<Option<Value>, WebApiError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ProtocolError;
    use serde_json::json;

    #[test]
    fn test_http_methods() {
        assert_eq!(Operation::Retrieve.http_method(), "GET");
        assert_eq!(Operation::Create.http_method(), "POST");
        assert_eq!(Operation::Update.http_method(), "PATCH");
        assert_eq!(Operation::Upsert.http_method(), "PATCH");
        assert_eq!(Operation::disassociate(None).http_method(), "DELETE");
        assert_eq!(Operation::associate("contacts", "x").http_method(), "POST");
        assert_eq!(Operation::call_action("WinOpportunity").http_method(), "POST");
        assert_eq!(Operation::FetchXml.http_method(), "GET");
    }

    #[test]
    fn test_operation_type_names() {
        assert_eq!(Operation::RetrieveMultiple.operation_type(), "retrieve_multiple");
        assert_eq!(Operation::call_action("a").operation_type(), "call_action");
        assert!(Operation::Delete.requires_key());
        assert!(!Operation::Create.requires_key());
        assert!(Operation::CallFunction.allows_unbound());
    }

    #[test]
    fn test_result_into_result() {
        let ok = OperationResult::success(Operation::Create, 204, BTreeMap::new(), None);
        assert!(ok.is_success());
        assert_eq!(ok.into_result().unwrap(), None);

        let failure = OperationResult::error(
            Operation::Delete,
            ProtocolError::from_response(404, BTreeMap::new(), String::new()).into(),
        );
        assert!(failure.is_error());
        assert_eq!(failure.status_code, Some(404));
        assert!(failure.into_result().is_err());
    }

    #[test]
    fn test_entity_id_from_part_headers() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "odata-entityid".to_string(),
            "https://org/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000003)".to_string(),
        );
        let result = OperationResult::success(Operation::Create, 204, headers, Some(json!(null)));
        assert_eq!(
            result.entity_id().as_deref(),
            Some("00000000-0000-0000-0000-000000000003")
        );
    }
}
