use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dynamics_webapi::api::{HttpRequest, HttpResponse, Transport, TransportError};
use dynamics_webapi::{ClientConfig, DynamicsClient};

pub const GUID: &str = "00000000-0000-0000-0000-000000000001";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Replays canned responses in order and records every request it sees
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    sent: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn respond(self, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        self.responses.lock().unwrap().push_back(HttpResponse {
            status,
            headers,
            body: body.to_string(),
        });
        self
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted response left"))
    }
}

pub fn client(transport: Arc<ScriptedTransport>) -> DynamicsClient {
    init_logging();
    let config = ClientConfig::builder()
        .server_url("https://org.crm.dynamics.com")
        .build();
    DynamicsClient::new(config, transport)
}
