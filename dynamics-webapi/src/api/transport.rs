//! HTTP transport seam
//!
//! The translation layer never opens sockets itself. It hands a fully composed
//! [`HttpRequest`] to a [`Transport`] and gets back the raw status, headers and
//! text. [`dispatch`] wraps every exchange with the cooperative abort signal
//! and the timeout, so a cancelled or expired call never reaches the parsers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Notify;

use super::error::{TransportError, TransportErrorCode};

/// Cooperative cancellation token shared between a caller and an in-flight request
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation. Idempotent.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once [`abort`](Self::abort) has been called
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// A request as plain data
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

/// A response as plain data. Header names are lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Executes one HTTP exchange
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Run one exchange under the abort signal and timeout
///
/// An abort before or during the wait yields `ABORT_ERR`; an expired timeout
/// yields `ECONNRESET`. In both cases any partial response is dropped.
pub async fn dispatch(
    transport: &dyn Transport,
    request: HttpRequest,
    signal: Option<&AbortSignal>,
) -> Result<HttpResponse, TransportError> {
    if signal.is_some_and(AbortSignal::is_aborted) {
        return Err(TransportError::aborted());
    }

    let timeout = request.timeout;
    debug!("{} {}", request.method, request.url);

    let exchange = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, transport.send(request)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::timed_out(limit.as_millis())),
            },
            None => transport.send(request).await,
        }
    };

    let abort = async {
        match signal {
            Some(signal) => signal.aborted().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = abort => Err(TransportError::aborted()),
        result = exchange => result,
    }
}

/// [`Transport`] backed by a `reqwest::Client` with a static bearer token
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    access_token: Option<String>,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransportError::new(TransportErrorCode::Network, format!("invalid method: {}", e))
        })?;

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let code = if err.is_timeout() {
        TransportErrorCode::ConnectionReset
    } else if err.is_connect() {
        TransportErrorCode::ConnectionRefused
    } else {
        TransportErrorCode::Network
    };
    TransportError::new(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct SlowTransport {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(HttpResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: "{}".to_string(),
            })
        }
    }

    fn request(timeout: Option<Duration>) -> HttpRequest {
        HttpRequest {
            method: "GET".to_string(),
            url: "https://org.example.com/api/data/v9.2/accounts".to_string(),
            headers: BTreeMap::new(),
            body: None,
            timeout,
        }
    }

    fn slow(delay_ms: u64) -> SlowTransport {
        SlowTransport {
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_completes_without_signal() {
        let transport = slow(1);
        let response = dispatch(&transport, request(None), None).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_pre_aborted_signal_never_sends() {
        let transport = slow(1);
        let signal = AbortSignal::new();
        signal.abort();

        let err = dispatch(&transport, request(None), Some(&signal)).await.unwrap_err();
        assert_eq!(err.code, TransportErrorCode::Aborted);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_during_wait() {
        let transport = slow(10_000);
        let signal = AbortSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.abort();
        });

        let err = dispatch(&transport, request(None), Some(&signal)).await.unwrap_err();
        assert_eq!(err.code.as_str(), "ABORT_ERR");
    }

    #[tokio::test]
    async fn test_timeout_is_connection_reset() {
        let transport = slow(10_000);
        let err = dispatch(&transport, request(Some(Duration::from_millis(20))), None)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "ECONNRESET");
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("odata-entityid".to_string(), "x".to_string());
        let response = HttpResponse {
            status: 204,
            headers,
            body: String::new(),
        };
        assert!(response.is_success());
        assert_eq!(response.header("OData-EntityId"), Some("x"));
    }
}
