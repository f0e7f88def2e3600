//! Remote endpoint and transport configuration.

use std::fmt;
use std::time::Duration;

use reqwest::Url;

use crate::error::{Error, Result};

/// Bearer credential presented to the remote API.
///
/// Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(Error::InvalidInput(
                "authentication token must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Raw credential value. Only the transport's auth header should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Base URL and credential of a remote management API.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    base_url: Url,
    token: Token,
}

impl RemoteEndpoint {
    /// Validate and build an endpoint.
    ///
    /// The URL must be http(s) without embedded user info, so that no
    /// credential can leak through a URL rendered in logs or errors.
    pub fn new(base_url: &str, token: Token) -> Result<Self> {
        let mut url = Url::parse(base_url.trim())
            .map_err(|e| Error::InvalidInput(format!("invalid endpoint URL: {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::InvalidInput(format!(
                "unsupported URL scheme '{}', expected http or https",
                url.scheme()
            )));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::InvalidInput(
                "endpoint URL must not embed credentials, pass the token separately".to_string(),
            ));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(Error::InvalidInput(
                "endpoint URL must not carry a query or fragment".to_string(),
            ));
        }

        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(&trimmed);

        Ok(Self {
            base_url: url,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Full URL for a route such as `/api/user_groups/search`.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Tunables for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for one complete exchange.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Verify the server certificate. Disable only for self-signed lab setups.
    pub verify_tls: bool,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            verify_tls: true,
            user_agent: format!("sonarsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
