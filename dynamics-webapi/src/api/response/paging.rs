//! FetchXml paging cookies

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::error::WebApiError;

static COOKIE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)(<cookie page="(\d+)".*</cookie>)"#).unwrap());

static PAGING_ATTRIBUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+(?:page|paging-cookie)\s*=\s*"[^"]*""#).unwrap());

/// Position in a FetchXml result set. `next_page` is `page + 1`, saturating at `u32::MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingInfo {
    pub cookie: String,
    pub page: u32,
    #[serde(rename = "nextPage")]
    pub next_page: u32,
}

impl PagingInfo {
    pub fn new(cookie: impl Into<String>, page: u32) -> Self {
        Self {
            cookie: cookie.into(),
            page,
            next_page: page.saturating_add(1),
        }
    }

    /// Decode the `@Microsoft.Dynamics.CRM.fetchxmlpagingcookie` annotation
    ///
    /// The annotation is an XML element whose `pagingcookie` attribute holds a
    /// twice URL-encoded `<cookie page="n">` document. Without a usable cookie
    /// the result points at `current_page`.
    pub fn from_annotation(annotation: Option<&str>, current_page: u32) -> Self {
        let current_page = current_page.max(1);
        let annotation = match annotation.map(str::trim).filter(|a| !a.is_empty()) {
            Some(annotation) => annotation,
            None => return Self::new("", current_page),
        };

        let encoded = roxmltree::Document::parse(annotation)
            .ok()
            .and_then(|doc| doc.root_element().attribute("pagingcookie").map(str::to_string))
            .unwrap_or_else(|| annotation.to_string());
        let decoded = url_decode(&url_decode(&encoded));

        match COOKIE.captures(&decoded) {
            Some(captures) => {
                let page = captures[2].parse().unwrap_or(current_page);
                Self::new(&captures[1], page)
            }
            None => Self::new("", current_page),
        }
    }
}

impl Default for PagingInfo {
    fn default() -> Self {
        Self::new("", 1)
    }
}

/// Set `page` and `paging-cookie` on the `<fetch>` element to request the next page
pub fn fetch_xml_with_paging(fetch_xml: &str, paging: &PagingInfo) -> Result<String, WebApiError> {
    let start = fetch_xml
        .find("<fetch")
        .ok_or_else(|| WebApiError::usage("fetch_xml requires a <fetch> root element"))?;
    let end = fetch_xml[start..]
        .find('>')
        .map(|offset| start + offset)
        .ok_or_else(|| WebApiError::usage("fetch_xml has an unterminated <fetch> element"))?;

    let tag = &fetch_xml[start..end];
    let (tag, self_closing) = match tag.strip_suffix('/') {
        Some(open) => (open, true),
        None => (tag, false),
    };

    let mut rewritten = PAGING_ATTRIBUTES.replace_all(tag, "").trim_end().to_string();
    rewritten.push_str(&format!(" page=\"{}\"", paging.next_page));
    if !paging.cookie.is_empty() {
        rewritten.push_str(&format!(
            " paging-cookie=\"{}\"",
            quick_xml::escape::escape(paging.cookie.as_str())
        ));
    }
    if self_closing {
        rewritten.push('/');
    }

    Ok(format!("{}{}{}", &fetch_xml[..start], rewritten, &fetch_xml[end..]))
}

fn url_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
