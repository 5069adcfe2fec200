//! Response decoding: status mapping, annotation normalization and paging

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::annotations;
use super::dates;
use super::paging::PagingInfo;
use crate::api::constants::{annotations as odata, headers};
use crate::api::error::{ProtocolError, WebApiError};
use crate::api::transport::HttpResponse;

/// Per-request parsing switches, decided when the request is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Return only the `oDataCount` number instead of the record set
    pub to_count: bool,
    /// Present for FetchXml requests; drives the `PagingInfo` projection
    pub page_number: Option<u32>,
}

/// A successful, normalized response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub paging: Option<PagingInfo>,
}

impl ParsedResponse {
    /// Id of a created or upserted record, taken from the `OData-EntityId` header
    pub fn entity_id(&self) -> Option<String> {
        entity_id_from_headers(&self.headers)
    }

    /// Date literal at `field`, a top-level name or a JSON pointer
    pub fn date(&self, field: &str) -> Option<DateTime<Utc>> {
        let body = self.body.as_ref()?;
        let value = if field.starts_with('/') {
            body.pointer(field)?
        } else {
            body.get(field)?
        };
        dates::revive(value)
    }

    /// Every date literal in the body, keyed by JSON pointer
    pub fn dates(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.body.as_ref().map(dates::collect).unwrap_or_default()
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Option<T>, WebApiError> {
        self.body
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| WebApiError::response_format(format!("cannot deserialize response body: {}", e)))
    }
}

/// Key inside the parentheses of the `OData-EntityId` header
pub fn entity_id_from_headers(headers: &BTreeMap<String, String>) -> Option<String> {
    let location = headers.get(headers::ODATA_ENTITY_ID)?;
    let start = location.rfind('(')? + 1;
    let end = location[start..].find(')')? + start;
    Some(location[start..end].to_string())
}

/// Turn a raw exchange into a [`ParsedResponse`] or a protocol error
pub fn parse_response(response: HttpResponse, options: ParseOptions) -> Result<ParsedResponse, WebApiError> {
    if !response.is_success() {
        return Err(ProtocolError::from_response(response.status, response.headers, response.body).into());
    }

    let body = parse_body(&response.body, options)?;
    let paging = match (&body, options.page_number) {
        (Some(Value::Object(map)), Some(_)) => map
            .get("PagingInfo")
            .cloned()
            .and_then(|info| serde_json::from_value(info).ok()),
        _ => None,
    };

    Ok(ParsedResponse {
        status: response.status,
        headers: response.headers,
        body,
        paging,
    })
}

/// Decode and normalize a response body
///
/// Empty text yields `None`. Text that is not JSON is returned as a string.
pub fn parse_body(text: &str, options: ParseOptions) -> Result<Option<Value>, WebApiError> {
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Response body is not JSON ({}), returning raw text", e);
            return Ok(Some(Value::String(text.to_string())));
        }
    };

    let mut value = annotations::normalize(value)?;

    if options.to_count {
        return match value.get("oDataCount") {
            Some(count) => Ok(Some(count.clone())),
            None => Err(WebApiError::response_format(
                "count requested but the response carries no @odata.count",
            )),
        };
    }

    if let (Some(page), Value::Object(map)) = (options.page_number, &mut value) {
        let cookie = map
            .get(&format!("@{}", odata::FETCHXML_PAGING_COOKIE))
            .and_then(Value::as_str);
        let info = PagingInfo::from_annotation(cookie, page);
        let info = serde_json::to_value(info)
            .map_err(|e| WebApiError::response_format(format!("cannot encode paging info: {}", e)))?;
        map.insert("PagingInfo".to_string(), info);
    }

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_single_record_annotations() {
        let parsed = parse_response(
            response(
                200,
                r#"{"@odata.context":"ctx","name":"A","name@OData.Community.Display.V1.FormattedValue":"A!"}"#,
            ),
            ParseOptions::default(),
        )
        .unwrap();

        let body = parsed.body.unwrap();
        assert_eq!(body["oDataContext"], "ctx");
        assert_eq!(body["name"], "A");
        assert_eq!(body["name_Formatted"], "A!");
        assert!(parsed.paging.is_none());
    }

    #[test]
    fn test_empty_and_bom_bodies() {
        assert_eq!(parse_body("", ParseOptions::default()).unwrap(), None);
        assert_eq!(parse_body("  \r\n", ParseOptions::default()).unwrap(), None);
        assert_eq!(
            parse_body("\u{feff}{\"a\":1}", ParseOptions::default()).unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_raw_text_and_plain_numbers() {
        assert_eq!(parse_body("42", ParseOptions::default()).unwrap(), Some(json!(42)));
        assert_eq!(
            parse_body("not json", ParseOptions::default()).unwrap(),
            Some(json!("not json"))
        );
    }

    #[test]
    fn test_to_count() {
        let options = ParseOptions {
            to_count: true,
            page_number: None,
        };
        assert_eq!(
            parse_body(r#"{"@odata.count":7,"value":[]}"#, options).unwrap(),
            Some(json!(7))
        );
        assert!(parse_body(r#"{"value":[]}"#, options).is_err());
    }

    #[test]
    fn test_paging_defaults_without_cookie() {
        let options = ParseOptions {
            to_count: false,
            page_number: Some(1),
        };
        let parsed = parse_response(response(200, r#"{"value":[{"name":"A"}]}"#), options).unwrap();

        assert_eq!(parsed.paging, Some(PagingInfo::new("", 1)));
        assert_eq!(
            parsed.body.unwrap()["PagingInfo"],
            json!({"cookie": "", "page": 1, "nextPage": 2})
        );
    }

    #[test]
    fn test_error_status_is_protocol_error() {
        let err = parse_response(
            response(404, r#"{"error":{"code":"0x80040217","message":"missing"}}"#),
            ParseOptions::default(),
        )
        .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_entity_id_and_dates() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "odata-entityid".to_string(),
            "https://org/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000001)".to_string(),
        );
        let parsed = ParsedResponse {
            status: 204,
            headers,
            body: Some(json!({"createdon": "2024-01-02T03:04:05Z", "value": [{"modifiedon": "2024-01-02"}]})),
            paging: None,
        };

        assert_eq!(
            parsed.entity_id().as_deref(),
            Some("00000000-0000-0000-0000-000000000001")
        );
        assert!(parsed.date("createdon").is_some());
        assert!(parsed.date("/value/0/modifiedon").is_none());
        assert!(parsed.date("missing").is_none());

        let dates = parsed.dates();
        assert_eq!(dates.len(), 1);
        assert_eq!(dates.get("/createdon"), parsed.date("createdon").as_ref());
    }
}
