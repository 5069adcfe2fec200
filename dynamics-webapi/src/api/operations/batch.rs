//! Batch encoding and decoding
//!
//! A batch is one `multipart/mixed` POST to `$batch`. Atomic requests are
//! grouped into nested `changeset_*` parts that the server runs as a single
//! transaction; everything else becomes a standalone part. Every step here is
//! a pure function over strings so it can be tested without a server.

use std::collections::BTreeMap;

use log::{debug, warn};
use uuid::Uuid;

use super::operation::OperationResult;
use super::request::AssembledRequest;
use crate::api::constants::{AUTO_CONTENT_ID_START, HTTP_PART_CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::api::error::{ProtocolError, WebApiError};
use crate::api::response::parse_body;

const CRLF: &str = "\r\n";

/// Requests collected between `start_batch` and `execute_batch`, in call order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchQueue {
    requests: Vec<AssembledRequest>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: AssembledRequest) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[AssembledRequest] {
        &self.requests
    }
}

/// One top-level part of the envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPart {
    /// Standalone request, by queue index
    Single { index: usize },
    /// Atomic group with its own boundary
    ChangeSet {
        boundary: String,
        members: Vec<ChangeSetMember>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetMember {
    pub index: usize,
    pub content_id: String,
}

/// Grouping plan for a queue: outer boundary plus ordered parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEnvelope {
    pub boundary: String,
    pub parts: Vec<BatchPart>,
}

impl BatchEnvelope {
    /// Plan the envelope using random boundary tokens
    pub fn plan(requests: &[AssembledRequest]) -> Result<Self, WebApiError> {
        Self::plan_with(requests, || Uuid::new_v4().to_string())
    }

    /// Plan the envelope drawing boundary tokens from `next_token`
    ///
    /// A request is atomic unless it opted out with `in_change_set(false)` or is
    /// a GET. Consecutive atomic requests share a changeset; a standalone
    /// request closes the open changeset first.
    pub fn plan_with<F>(requests: &[AssembledRequest], mut next_token: F) -> Result<Self, WebApiError>
    where
        F: FnMut() -> String,
    {
        if requests.is_empty() {
            return Err(WebApiError::response_format(
                "empty batch payload: no requests were queued between start_batch() and execute_batch()",
            ));
        }

        let boundary = format!("dwa_batch_{}", next_token());
        let mut parts = Vec::new();
        let mut open: Option<Vec<usize>> = None;

        for (index, request) in requests.iter().enumerate() {
            if request.in_change_set && request.method != "GET" {
                open.get_or_insert_with(Vec::new).push(index);
            } else {
                if let Some(members) = open.take() {
                    parts.push(close_change_set(requests, members, &mut next_token));
                }
                parts.push(BatchPart::Single { index });
            }
        }
        if let Some(members) = open.take() {
            parts.push(close_change_set(requests, members, &mut next_token));
        }

        Ok(Self { boundary, parts })
    }

    /// `Content-Type` of the outer request
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    /// Serialize the envelope with CRLF line endings
    pub fn render(&self, requests: &[AssembledRequest], base_url: &str) -> String {
        let mut out = String::new();

        for part in &self.parts {
            out.push_str(&format!("--{}{}", self.boundary, CRLF));
            match part {
                BatchPart::Single { index } => {
                    render_request(&mut out, &requests[*index], base_url, None);
                }
                BatchPart::ChangeSet { boundary, members } => {
                    out.push_str(&format!("Content-Type: multipart/mixed; boundary={}{}", boundary, CRLF));
                    out.push_str(CRLF);
                    for member in members {
                        out.push_str(&format!("--{}{}", boundary, CRLF));
                        render_request(&mut out, &requests[member.index], base_url, Some(&member.content_id));
                    }
                    out.push_str(&format!("--{}--{}", boundary, CRLF));
                }
            }
        }

        out.push_str(&format!("--{}--{}", self.boundary, CRLF));
        out
    }
}

/// Wire form of a batch, ready to POST
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub envelope: BatchEnvelope,
    pub content_type: String,
    pub body: String,
}

/// Encode `requests` for the Web API rooted at `base_url`
pub fn encode(requests: &[AssembledRequest], base_url: &str) -> Result<EncodedBatch, WebApiError> {
    let envelope = BatchEnvelope::plan(requests)?;
    let body = envelope.render(requests, base_url);
    debug!(
        "Encoded batch of {} requests in {} parts ({} bytes)",
        requests.len(),
        envelope.parts.len(),
        body.len()
    );

    Ok(EncodedBatch {
        content_type: envelope.content_type(),
        envelope,
        body,
    })
}

fn close_change_set<F>(requests: &[AssembledRequest], members: Vec<usize>, next_token: &mut F) -> BatchPart
where
    F: FnMut() -> String,
{
    let highest_user_id = members
        .iter()
        .filter_map(|i| requests[*i].content_id.as_deref())
        .filter_map(|id| id.parse::<u64>().ok())
        .max();
    let mut next_id = match highest_user_id {
        Some(id) if id >= AUTO_CONTENT_ID_START => id + 1,
        _ => AUTO_CONTENT_ID_START,
    };

    let members = members
        .into_iter()
        .map(|index| {
            let content_id = match requests[index].content_id.as_deref().filter(|id| !id.is_empty()) {
                Some(id) => id.to_string(),
                None => {
                    let id = next_id.to_string();
                    next_id += 1;
                    id
                }
            };
            ChangeSetMember { index, content_id }
        })
        .collect();

    BatchPart::ChangeSet {
        boundary: format!("changeset_{}", next_token()),
        members,
    }
}

fn render_request(out: &mut String, request: &AssembledRequest, base_url: &str, content_id: Option<&str>) {
    out.push_str(&format!("Content-Type: {}{}", HTTP_PART_CONTENT_TYPE, CRLF));
    out.push_str(&format!("Content-Transfer-Encoding: binary{}", CRLF));
    if let Some(id) = content_id {
        out.push_str(&format!("Content-ID: {}{}", id, CRLF));
    }
    out.push_str(CRLF);

    let url = if request.is_reference() {
        request.path.clone()
    } else {
        format!("{}{}", base_url, request.path)
    };
    out.push_str(&format!("{} {} HTTP/1.1{}", request.method, url, CRLF));

    for (name, value) in &request.headers {
        out.push_str(&format!("{}: {}{}", name, value, CRLF));
    }
    if request.method == "GET" && !request.headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
        out.push_str(&format!("Accept: {}{}", JSON_CONTENT_TYPE, CRLF));
    }
    out.push_str(CRLF);

    if let Some(body) = &request.body {
        out.push_str(body);
        out.push_str(CRLF);
    }
}

/// One leaf of a batch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePart {
    pub status: u16,
    /// Lower-cased header names
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub content_id: Option<String>,
}

impl ResponsePart {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Boundary parameter of a `multipart/mixed` content type
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|b| !b.is_empty())
}

/// Split a batch response into leaf parts, grouped by top-level part
///
/// A standalone part yields a group of one; a changeset yields one entry per
/// member, or a single error entry when the server rejected the changeset.
pub fn decode(content_type: Option<&str>, body: &str) -> Result<Vec<Vec<ResponsePart>>, WebApiError> {
    let text = body.replace("\r\n", "\n");

    let boundary = content_type
        .and_then(boundary_from_content_type)
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .and_then(|line| line.strip_prefix("--"))
                .map(str::to_string)
        })
        .ok_or_else(|| WebApiError::response_format("unparseable batch envelope: no boundary found"))?;

    split_multipart(&text, &boundary)?
        .iter()
        .map(|part| decode_part(part))
        .collect()
}

fn decode_part(part: &str) -> Result<Vec<ResponsePart>, WebApiError> {
    let (headers, content) = split_head(part);
    match headers.get("content-type") {
        Some(ct) if ct.to_ascii_lowercase().starts_with("multipart/mixed") => {
            let nested = boundary_from_content_type(ct).ok_or_else(|| {
                WebApiError::response_format("unparseable batch envelope: changeset without boundary")
            })?;
            split_multipart(content, &nested)?
                .iter()
                .map(|leaf| parse_leaf(leaf))
                .collect()
        }
        _ => Ok(vec![leaf_from(&headers, content)?]),
    }
}

/// Pair decoded parts with the queued requests and parse each one
///
/// Results come back in queue order. When a changeset failed as a whole, its
/// single error part is reported for every member.
pub fn align(
    requests: &[AssembledRequest],
    envelope: &BatchEnvelope,
    groups: Vec<Vec<ResponsePart>>,
) -> Result<Vec<OperationResult>, WebApiError> {
    let leaves: usize = groups.iter().map(Vec::len).sum();

    if groups.len() == envelope.parts.len() {
        if let Some(results) = align_to_envelope(requests, envelope, &groups) {
            return Ok(results);
        }
    }

    if leaves == requests.len() {
        return Ok(requests
            .iter()
            .zip(groups.into_iter().flatten())
            .map(|(request, part)| to_result(request, &part))
            .collect());
    }

    Err(mismatch(requests.len(), leaves))
}

/// Changeset members are matched by Content-ID, falling back to position
fn align_to_envelope(
    requests: &[AssembledRequest],
    envelope: &BatchEnvelope,
    groups: &[Vec<ResponsePart>],
) -> Option<Vec<OperationResult>> {
    let mut results: Vec<Option<OperationResult>> = vec![None; requests.len()];
    for (part, group) in envelope.parts.iter().zip(groups) {
        match part {
            BatchPart::Single { index } if group.len() == 1 => {
                results[*index] = Some(to_result(&requests[*index], &group[0]));
            }
            BatchPart::ChangeSet { members, .. } if group.len() == members.len() => {
                for (position, member) in members.iter().enumerate() {
                    let leaf = group
                        .iter()
                        .find(|leaf| leaf.content_id.as_deref() == Some(member.content_id.as_str()))
                        .unwrap_or(&group[position]);
                    results[member.index] = Some(to_result(&requests[member.index], leaf));
                }
            }
            BatchPart::ChangeSet { members, .. } if group.len() == 1 && !group[0].is_success() => {
                warn!(
                    "Changeset of {} requests failed with status {}",
                    members.len(),
                    group[0].status
                );
                for member in members {
                    results[member.index] = Some(to_result(&requests[member.index], &group[0]));
                }
            }
            _ => return None,
        }
    }

    results.into_iter().collect()
}

fn to_result(request: &AssembledRequest, part: &ResponsePart) -> OperationResult {
    if !part.is_success() {
        let error = ProtocolError::from_response(part.status, part.headers.clone(), part.body.clone());
        return OperationResult::error(request.operation.clone(), error.into());
    }

    match parse_body(&part.body, request.parse) {
        Ok(data) => OperationResult::success(request.operation.clone(), part.status, part.headers.clone(), data),
        Err(e) => OperationResult::error(request.operation.clone(), e),
    }
}

fn mismatch(expected: usize, found: usize) -> WebApiError {
    WebApiError::response_format(format!(
        "unparseable batch envelope: {} requests were sent but {} response parts came back",
        expected, found
    ))
}

fn split_multipart(text: &str, boundary: &str) -> Result<Vec<String>, WebApiError> {
    let delimiter = format!("--{}", boundary);
    let terminator = format!("--{}--", boundary);

    let mut parts = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.split('\n') {
        let marker = line.trim_end();
        if marker == terminator {
            if let Some(lines) = current.take() {
                parts.push(lines.join("\n"));
            }
            break;
        }
        if marker == delimiter {
            if let Some(lines) = current.take() {
                parts.push(lines.join("\n"));
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current.take() {
        parts.push(lines.join("\n"));
    }

    if parts.is_empty() {
        return Err(WebApiError::response_format(format!(
            "unparseable batch envelope: no parts delimited by '{}'",
            boundary
        )));
    }
    Ok(parts)
}

/// Split a header block from the content after the first blank line
fn split_head(text: &str) -> (BTreeMap<String, String>, &str) {
    if let Some(rest) = text.strip_prefix('\n') {
        return (BTreeMap::new(), rest);
    }
    let (head, rest) = match text.find("\n\n") {
        Some(pos) => (&text[..pos], &text[pos + 2..]),
        None => (text, ""),
    };

    let headers = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    (headers, rest)
}

fn parse_leaf(part: &str) -> Result<ResponsePart, WebApiError> {
    let (headers, content) = split_head(part);
    leaf_from(&headers, content)
}

fn leaf_from(part_headers: &BTreeMap<String, String>, content: &str) -> Result<ResponsePart, WebApiError> {
    let content = content.trim_start_matches('\n');
    let (status_line, rest) = content.split_once('\n').unwrap_or((content, ""));

    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            WebApiError::response_format(format!(
                "unparseable batch envelope: bad status line '{}'",
                status_line.trim()
            ))
        })?;

    let (headers, body) = split_head(rest);
    Ok(ResponsePart {
        status,
        headers,
        body: body.trim().to_string(),
        content_id: part_headers.get("content-id").cloned(),
    })
}
