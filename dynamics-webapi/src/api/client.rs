//! Dynamics Web API client
//!
//! Standalone calls go descriptor → assembler → transport → response parser.
//! Between [`DynamicsClient::start_batch`] and [`DynamicsClient::execute_batch`]
//! assembled requests are queued instead and sent as one `$batch` exchange.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use log::{debug, warn};
use serde_json::Value;

use super::constants::{JSON_CONTENT_TYPE, headers};
use super::error::{ProtocolError, WebApiError};
use super::headers::compose_headers;
use super::models::Request;
use super::operations::batch::{self, BatchQueue};
use super::operations::{AssembledRequest, Operation, OperationResult, assemble};
use super::response::{ParsedResponse, parse_response};
use super::transport::{HttpRequest, ReqwestTransport, Transport, dispatch};
use super::validation;
use crate::config::ClientConfig;

pub struct DynamicsClient {
    config: ArcSwap<ClientConfig>,
    transport: Arc<dyn Transport>,
    batch: Mutex<Option<BatchQueue>>,
}

impl DynamicsClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            transport,
            batch: Mutex::new(None),
        }
    }

    /// Client over HTTPS with a static bearer token
    pub fn with_access_token(config: ClientConfig, access_token: impl Into<String>) -> Self {
        let transport = ReqwestTransport::default().with_access_token(access_token);
        Self::new(config, Arc::new(transport))
    }

    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.load_full()
    }

    /// Replace the client configuration; requests already assembled keep the old one
    pub fn set_config(&self, config: ClientConfig) {
        self.config.store(Arc::new(config));
    }

    /// Assemble `request` without sending it
    pub fn compose(&self, operation: &Operation, request: &Request) -> Result<AssembledRequest, WebApiError> {
        assemble(operation, request, &self.config.load(), false)
    }

    /// Assemble, send and parse one request
    pub async fn execute(&self, operation: Operation, request: &Request) -> Result<ParsedResponse, WebApiError> {
        let config = self.config.load_full();
        let assembled = assemble(&operation, request, &config, false)?;
        let parse = assembled.parse;

        let mut headers = assembled.headers;
        add_protocol_headers(&mut headers);

        let http_request = HttpRequest {
            method: assembled.method.to_string(),
            url: format!("{}{}", config.web_api_url(), assembled.path),
            headers,
            body: assembled.body,
            timeout: request.timeout.or(config.timeout),
        };

        let response = dispatch(self.transport.as_ref(), http_request, request.signal.as_ref()).await?;
        if !response.is_success() {
            warn!(
                "{} failed with status {}",
                operation.operation_type(),
                response.status
            );
        }
        parse_response(response, parse)
    }

    pub async fn retrieve(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::Retrieve, request).await
    }

    pub async fn retrieve_multiple(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::RetrieveMultiple, request).await
    }

    pub async fn create(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::Create, request).await
    }

    pub async fn update(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::Update, request).await
    }

    pub async fn upsert(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::Upsert, request).await
    }

    pub async fn delete(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::Delete, request).await
    }

    /// Number of records matching the request
    pub async fn count(&self, request: &Request) -> Result<u64, WebApiError> {
        let response = self.execute(Operation::Count, request).await?;
        response
            .body
            .as_ref()
            .and_then(|body| match body {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .ok_or_else(|| WebApiError::response_format("count response is not a number"))
    }

    pub async fn associate(
        &self,
        request: &Request,
        related_collection: &str,
        related_key: &str,
    ) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::associate(related_collection, related_key), request)
            .await
    }

    pub async fn disassociate(
        &self,
        request: &Request,
        related_key: Option<&str>,
    ) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::disassociate(related_key.map(str::to_string)), request)
            .await
    }

    pub async fn call_function(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::CallFunction, request).await
    }

    pub async fn call_action(&self, request: &Request, action: &str) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::call_action(action), request).await
    }

    /// Run a FetchXml query; the response carries `PagingInfo`
    pub async fn fetch_xml(&self, request: &Request) -> Result<ParsedResponse, WebApiError> {
        self.execute(Operation::FetchXml, request).await
    }

    /// Open a batch queue; an already open queue is discarded
    pub fn start_batch(&self) {
        let mut batch = self.lock_batch();
        if let Some(previous) = batch.as_ref() {
            warn!(
                "start_batch called with an open batch; discarding {} queued requests",
                previous.len()
            );
        }
        *batch = Some(BatchQueue::new());
    }

    pub fn is_batch_open(&self) -> bool {
        self.lock_batch().is_some()
    }

    /// Assemble `request` and append it to the open batch
    ///
    /// Requests without a collection but with a Content-ID address an earlier
    /// member of the same changeset as `$<id>`.
    pub fn enqueue(&self, operation: Operation, request: &Request) -> Result<(), WebApiError> {
        let mut batch = self.lock_batch();
        let queue = batch
            .as_mut()
            .ok_or_else(|| validation::batch_not_started(operation.operation_type()))?;

        let assembled = assemble(&operation, request, &self.config.load(), true)?;
        debug!("Queued {} {} as batch member {}", assembled.method, assembled.path, queue.len() + 1);
        queue.push(assembled);
        Ok(())
    }

    /// Drop the open batch without sending it
    pub fn clear_batch(&self) {
        self.lock_batch().take();
    }

    /// Send the queued requests as one batch
    ///
    /// `options` applies to the outer exchange: `continue_on_error`,
    /// impersonation, custom headers, signal and timeout. The queue is closed
    /// whatever the outcome. Results are in queue order.
    pub async fn execute_batch(&self, options: &Request) -> Result<Vec<OperationResult>, WebApiError> {
        let queue = self
            .lock_batch()
            .take()
            .ok_or_else(|| validation::batch_not_started("execute_batch"))?;

        let config = self.config.load_full();
        let encoded = batch::encode(queue.requests(), &config.web_api_url())?;

        let mut headers = compose_headers(options, &config, "execute_batch")?;
        add_protocol_headers(&mut headers);
        headers.insert(headers::CONTENT_TYPE.to_string(), encoded.content_type.clone());

        let http_request = HttpRequest {
            method: "POST".to_string(),
            url: format!("{}$batch", config.web_api_url()),
            headers,
            body: Some(encoded.body),
            timeout: options.timeout.or(config.timeout),
        };

        debug!("Sending batch with {} requests", queue.len());
        let response = dispatch(self.transport.as_ref(), http_request, options.signal.as_ref()).await?;
        if !response.is_success() {
            warn!("Batch failed with status {}", response.status);
            return Err(ProtocolError::from_response(response.status, response.headers, response.body).into());
        }

        let groups = batch::decode(response.header(headers::CONTENT_TYPE), &response.body)?;
        batch::align(queue.requests(), &encoded.envelope, groups)
    }

    fn lock_batch(&self) -> MutexGuard<'_, Option<BatchQueue>> {
        self.batch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn add_protocol_headers(headers: &mut BTreeMap<String, String>) {
    for (name, value) in [
        (headers::ODATA_MAX_VERSION, "4.0"),
        (headers::ODATA_VERSION, "4.0"),
        (headers::ACCEPT, JSON_CONTENT_TYPE),
    ] {
        if !headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
            headers.insert(name.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::TransportError;
    use crate::api::transport::HttpResponse;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            panic!("transport must not be called");
        }
    }

    fn client() -> DynamicsClient {
        let config = ClientConfig::builder().server_url("https://org.crm.dynamics.com").build();
        DynamicsClient::new(config, Arc::new(Unreachable))
    }

    #[test]
    fn test_enqueue_requires_open_batch() {
        let client = client();
        let err = client
            .enqueue(Operation::Create, &Request::new("accounts"))
            .unwrap_err();
        assert!(matches!(err, WebApiError::Usage { .. }));
        assert!(err.to_string().starts_with("create"));
    }

    #[test]
    fn test_start_and_clear_batch() {
        let client = client();
        client.start_batch();
        assert!(client.is_batch_open());
        client.enqueue(Operation::RetrieveMultiple, &Request::new("accounts")).unwrap();
        client.start_batch();
        client.clear_batch();
        assert!(!client.is_batch_open());
    }

    #[tokio::test]
    async fn test_validation_fires_before_io() {
        let client = client();
        let mut request = Request::new("accounts").key("00000000-0000-0000-0000-000000000001");
        request.if_match = Some("a".to_string());
        request.if_none_match = Some("b".to_string());

        let err = client.update(&request).await.unwrap_err();
        assert!(matches!(err, WebApiError::Usage { .. }));
    }

    #[tokio::test]
    async fn test_execute_batch_without_start() {
        let err = client().execute_batch(&Request::default()).await.unwrap_err();
        assert!(err.to_string().contains("start_batch()"));
    }

    #[test]
    fn test_set_config_is_visible_to_compose() {
        let client = client();
        client.set_config(ClientConfig::builder().server_url("https://other").return_representation(true).build());

        let assembled = client.compose(&Operation::Create, &Request::new("accounts")).unwrap();
        assert_eq!(assembled.headers["Prefer"], "return=representation");
        assert_eq!(client.config().server_url, "https://other");
    }
}
