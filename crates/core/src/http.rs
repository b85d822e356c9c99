//! HTTP request/response model and the transport used to send them

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Method, Proxy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};

/// An outbound request, built from a test's `RequestSpec` and hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    /// Endpoint relative to the base URL, or an absolute URL
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing any existing value regardless of case
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.into());
    }
}

/// A received response. Header names are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Every `Set-Cookie` value, in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
    /// Parsed JSON body, or the raw text as a JSON string
    #[serde(default)]
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "set-cookie" {
            self.cookies.push(value.clone());
        }
        self.headers.insert(name, value);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Transport-level failure; never escapes the executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Timeout after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Sends a resolved request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport resolving endpoints against a base URL.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, user_agent: &str, proxy: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(user_agent)
            .map_err(|err| Error::InvalidConfig(format!("Invalid user agent: {err}")))?;
        headers.insert(USER_AGENT, agent);

        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(headers);

        if let Some(proxy_url) = proxy.filter(|p| !p.is_empty()) {
            let proxy = Proxy::all(proxy_url)
                .map_err(|err| Error::InvalidConfig(format!("Invalid proxy URL: {err}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|err| Error::InvalidConfig(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join an endpoint onto the base URL; absolute URLs pass through.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }
}

pub(crate) fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") || base.is_empty() {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn build_headers(input: &BTreeMap<String, String>) -> std::result::Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        if key.is_empty() {
            continue;
        }

        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| TransportError::Request(format!("Invalid header name `{key}`: {err}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            TransportError::Request(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| TransportError::Request(format!("Invalid HTTP method: {err}")))?;
        let url = self.resolve_url(&request.url);
        debug!("{} {}", method, url);

        let mut builder = self
            .client
            .request(method, &url)
            .headers(build_headers(&request.headers)?)
            .timeout(timeout);

        match &request.body {
            None | Some(Value::Null) => {}
            Some(Value::String(raw)) => builder = builder.body(raw.clone()),
            Some(json) => builder = builder.json(json),
        }

        let response = builder.send().await.map_err(|err| classify(err, timeout))?;

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in response.headers() {
            let value = value.to_str().unwrap_or_default().to_string();
            headers
                .entry(key.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        let bytes = response.bytes().await.map_err(|err| classify(err, timeout))?;
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

        Ok(HttpResponse {
            status,
            headers,
            cookies,
            body,
        })
    }
}
