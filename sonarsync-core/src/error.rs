//! Error taxonomy for remote reconciliation.
//!
//! Failures are classified once, at the transport boundary, from the HTTP
//! status code. Nothing downstream inspects human-readable remote text.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::transport::{Method, Payload};

/// Errors surfaced by the transport and the reconciler.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote system rejected the credential or denied the action.
    #[error("insufficient privileges: {0}")]
    Authorization(Box<Failure>),

    /// The resource already exists remotely.
    #[error("resource already exists: {0}")]
    Conflict(Box<Failure>),

    /// The resource is missing remotely.
    #[error("resource not found: {0}")]
    NotFound(Box<Failure>),

    /// Any other status, a transport failure, or a malformed response.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(Box<Failure>),

    /// The caller's cancellation signal fired before the call completed.
    #[error("reconciliation cancelled")]
    Cancelled,

    /// Caller-supplied input was rejected before any remote call.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Class of an [`Error`], as reported to the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    Conflict,
    NotFound,
    UnexpectedResponse,
    Cancelled,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnexpectedResponse => "unexpected_response",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid_input",
        };
        f.write_str(s)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UnexpectedResponse(_) => ErrorKind::UnexpectedResponse,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Request context of a remote failure, if this error came from one.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Error::Authorization(f)
            | Error::Conflict(f)
            | Error::NotFound(f)
            | Error::UnexpectedResponse(f) => Some(f),
            Error::Cancelled | Error::InvalidInput(_) => None,
        }
    }

    /// Classify a remote failure by HTTP status.
    ///
    /// A missing status means the exchange never produced a response
    /// (connect error, timeout, TLS failure).
    pub fn classify(failure: Failure) -> Self {
        let failure = Box::new(failure);
        match failure.status {
            Some(401) | Some(403) => Error::Authorization(failure),
            Some(404) => Error::NotFound(failure),
            Some(409) => Error::Conflict(failure),
            _ => Error::UnexpectedResponse(failure),
        }
    }

    /// Build an `UnexpectedResponse` for a payload that does not have the
    /// expected shape.
    pub fn malformed(method: Method, path: &str, detail: impl Into<String>) -> Self {
        Error::UnexpectedResponse(Box::new(Failure {
            method,
            path: path.to_string(),
            status: None,
            params: Vec::new(),
            remote: None,
            detail: Some(detail.into()),
        }))
    }
}

/// Request context attached to a classified remote failure.
///
/// Holds the route and parameters only; the credential travels in a header
/// and never lands here.
#[derive(Debug, Clone)]
pub struct Failure {
    pub method: Method,
    pub path: String,
    pub status: Option<u16>,
    pub params: Vec<(String, String)>,
    pub remote: Option<RemoteError>,
    pub detail: Option<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if let Some(status) = self.status {
            write!(f, " returned {status}")?;
        }
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        if let Some(remote) = &self.remote {
            write!(f, ": {remote}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Error body returned by the remote system.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    /// Messages from a `{"errors":[{"msg":...}]}` body.
    pub messages: Vec<String>,
    pub payload: Payload,
}

impl RemoteError {
    /// Extract structured messages from an error payload. Returns `None`
    /// for an empty body.
    pub fn from_payload(payload: Payload) -> Option<Self> {
        let messages = match &payload {
            Payload::Empty => return None,
            Payload::Json(value) => error_messages(value),
            Payload::Text(_) => Vec::new(),
        };
        Some(Self { messages, payload })
    }
}

fn error_messages(value: &Value) -> Vec<String> {
    value
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("msg").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.messages.is_empty() {
            return f.write_str(&self.messages.join("; "));
        }
        match &self.payload {
            Payload::Empty => Ok(()),
            Payload::Json(value) => write!(f, "{value}"),
            Payload::Text(text) => f.write_str(text),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
