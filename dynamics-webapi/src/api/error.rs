//! Error types for the Web API translation layer
//!
//! Every failure surfaces to the caller; nothing here retries.
//! `Usage` and `Composition` always fire before any I/O.

use std::collections::BTreeMap;
use std::fmt;

/// Stable machine-readable codes for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// The abort signal fired before or during the exchange
    Aborted,
    /// The connection was reset, including when the request timed out
    ConnectionReset,
    /// The server refused the connection
    ConnectionRefused,
    /// Any other network level failure
    Network,
}

impl TransportErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorCode::Aborted => "ABORT_ERR",
            TransportErrorCode::ConnectionReset => "ECONNRESET",
            TransportErrorCode::ConnectionRefused => "ECONNREFUSED",
            TransportErrorCode::Network => "ERR_NETWORK",
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single HTTP exchange, distinct from server-returned errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub code: TransportErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn aborted() -> Self {
        Self::new(TransportErrorCode::Aborted, "The user aborted a request.")
    }

    pub fn timed_out(timeout_ms: u128) -> Self {
        Self::new(
            TransportErrorCode::ConnectionReset,
            format!("socket hang up: request timed out after {}ms", timeout_ms),
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for TransportError {}

/// Non-2xx answer from the server, for a standalone call or one batch part
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    pub status: u16,
    /// Server error code from the OData error body (e.g. "0x80040217")
    pub code: Option<String>,
    pub message: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ProtocolError {
    /// Build from a raw response, pulling `error.code` / `error.message` out of the body when present
    pub fn from_response(status: u16, headers: BTreeMap<String, String>, body: String) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(body.trim_start_matches('\u{feff}'))
            .ok()
            .and_then(|value| value.get("error").cloned());

        let code = parsed
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .map(str::to_string);
        let message = parsed
            .as_ref()
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("Request failed with status {}", status)
                } else {
                    body.trim().to_string()
                }
            });

        Self {
            status,
            code,
            message,
            headers,
            body,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "HTTP {} [{}]: {}", self.status, code, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Crate-wide error
#[derive(Debug, Clone, PartialEq)]
pub enum WebApiError {
    /// An argument has the wrong shape or type
    Usage { message: String },
    /// A descriptor could not be assembled into a request (collection, key, async flag)
    Composition { message: String },
    /// The server answered with a non-2xx status
    Protocol(ProtocolError),
    /// The exchange never completed (abort, timeout, connection failure)
    Transport(TransportError),
    /// A response could not be interpreted (duplicate alias, bad batch envelope, empty batch)
    ResponseFormat { message: String },
}

impl WebApiError {
    pub fn usage(message: impl Into<String>) -> Self {
        WebApiError::Usage {
            message: message.into(),
        }
    }

    pub fn composition(message: impl Into<String>) -> Self {
        WebApiError::Composition {
            message: message.into(),
        }
    }

    pub fn response_format(message: impl Into<String>) -> Self {
        WebApiError::ResponseFormat {
            message: message.into(),
        }
    }

    /// Stable code for transport failures, `None` for everything else
    pub fn code(&self) -> Option<&'static str> {
        match self {
            WebApiError::Transport(err) => Some(err.code.as_str()),
            _ => None,
        }
    }

    /// HTTP status for protocol failures
    pub fn status(&self) -> Option<u16> {
        match self {
            WebApiError::Protocol(err) => Some(err.status),
            _ => None,
        }
    }
}

impl fmt::Display for WebApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebApiError::Usage { message } => write!(f, "{}", message),
            WebApiError::Composition { message } => write!(f, "{}", message),
            WebApiError::Protocol(err) => write!(f, "{}", err),
            WebApiError::Transport(err) => write!(f, "{}", err),
            WebApiError::ResponseFormat { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for WebApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebApiError::Protocol(err) => Some(err),
            WebApiError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for WebApiError {
    fn from(err: TransportError) -> Self {
        WebApiError::Transport(err)
    }
}

impl From<ProtocolError> for WebApiError {
    fn from(err: ProtocolError) -> Self {
        WebApiError::Protocol(err)
    }
}
