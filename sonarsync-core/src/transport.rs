//! Authenticated HTTP exchange with a remote management API.
//!
//! One [`Call`] maps to exactly one request. Failures are classified into
//! the [`Error`] taxonomy and returned; nothing is retried here, since the
//! idempotence of individual remote endpoints is unknown at this layer.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::endpoint::{RemoteEndpoint, TransportConfig};
use crate::error::{Error, Failure, RemoteError, Result};

/// HTTP verb of a call, chosen at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Status codes accepted when the call site declares none.
    pub fn default_accept(self) -> &'static [u16] {
        match self {
            Method::Get => &[200],
            Method::Post => &[200, 201],
            Method::Put => &[200],
            Method::Delete => &[200, 204],
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One remote exchange.
///
/// Parameters go into the query string for GET and into a form-encoded body
/// for every other verb.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    accept: Vec<u16>,
}

impl Call {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            accept: method.default_accept().to_vec(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Replace the acceptable status set for this call.
    pub fn accept(mut self, statuses: &[u16]) -> Self {
        self.accept = statuses.to_vec();
        self
    }

    pub fn accepts(&self, status: u16) -> bool {
        self.accept.contains(&status)
    }

    fn failure(
        &self,
        status: Option<u16>,
        remote: Option<RemoteError>,
        detail: Option<String>,
    ) -> Failure {
        Failure {
            method: self.method,
            path: self.path.clone(),
            status,
            params: self.params.clone(),
            remote,
            detail,
        }
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The body was empty.
    Empty,
    Json(Value),
    /// A non-empty body that is not JSON.
    Text(String),
}

impl Payload {
    /// Decode a body: empty stays empty, JSON if it parses, raw text otherwise.
    pub fn decode(body: &str) -> Self {
        if body.trim().is_empty() {
            return Payload::Empty;
        }
        match serde_json::from_str(body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(body.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Performs one authenticated exchange per call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, call: Call) -> Result<Payload>;
}

/// [`Transport`] over reqwest with basic auth (token as user, empty password).
pub struct HttpTransport {
    endpoint: RemoteEndpoint,
    client: Client,
}

impl HttpTransport {
    pub fn new(endpoint: RemoteEndpoint, config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, call: Call) -> Result<Payload> {
        let url = self.endpoint.url_for(&call.path);
        debug!(method = %call.method, path = %call.path, "Sending request");

        let mut request = self
            .client
            .request(call.method.as_reqwest(), &url)
            .basic_auth(self.endpoint.token().expose(), Some(""));
        if !call.params.is_empty() {
            request = match call.method {
                Method::Get => request.query(&call.params),
                Method::Post | Method::Put | Method::Delete => request.form(&call.params),
            };
        }

        let response = request.send().await.map_err(|e| {
            let detail = error_chain(&e.without_url());
            debug!(method = %call.method, path = %call.path, "Request failed: {}", detail);
            Error::classify(call.failure(None, None, Some(detail)))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            Error::classify(call.failure(
                Some(status),
                None,
                Some(format!(
                    "failed to read response body: {}",
                    error_chain(&e.without_url())
                )),
            ))
        })?;
        debug!(method = %call.method, path = %call.path, status, "Received response");

        let payload = Payload::decode(&body);
        if call.accepts(status) {
            Ok(payload)
        } else {
            Err(Error::classify(call.failure(
                Some(status),
                RemoteError::from_payload(payload),
                None,
            )))
        }
    }
}

/// Render an error with all of its causes, outermost first.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}
