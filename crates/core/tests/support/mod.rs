//! In-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use spectest_core::{
    HttpRequest, HttpResponse, PluginHost, RunConfig, RunContext, TestCase, Transport,
    TransportError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Timing of one handled request
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Answers from a route table; unknown routes get 200 with an empty object.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, (u16, Value)>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, status: u16, body: Value) -> Self {
        self.routes.insert(url.to_string(), (status, body));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call(&self, url: &str) -> Option<Call> {
        self.calls.lock().iter().find(|c| c.url == url).cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let (status, body) = self
            .routes
            .get(&request.url)
            .cloned()
            .unwrap_or((200, json!({})));
        self.calls.lock().push(Call {
            url: request.url.clone(),
            started,
            finished: Instant::now(),
        });
        Ok(HttpResponse::new(status, body))
    }
}

pub fn context(config: RunConfig, transport: Arc<ScriptedTransport>) -> RunContext {
    RunContext::with_transport(config, PluginHost::default(), transport)
}

pub fn case(name: &str, endpoint: &str) -> TestCase {
    let mut test = TestCase::new(name, endpoint);
    test.response.status = Some(200);
    test
}

pub fn depends(mut test: TestCase, on: &[&str]) -> TestCase {
    test.depends_on = on.iter().map(|d| d.to_string()).collect();
    test
}
