//! Flat module parameters from flags and an optional JSON argument file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use sonarsync_core::sonarqube::groups::DESCRIPTION;
use sonarsync_core::{
    DesiredState, Error, Presence, RemoteEndpoint, ResourceKey, Token, TransportConfig,
};

/// Parameters as supplied by the automation runner. Every field is optional
/// here; [`ModuleParams::resolve`] enforces what is required.
///
/// Unknown keys are ignored so runner-internal fields can pass through.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct ModuleParams {
    pub url: Option<String>,
    pub token: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: Option<Presence>,
    pub check_mode: Option<bool>,
    /// Check mode as injected by the runner; either flag enables it.
    #[serde(rename = "_ansible_check_mode")]
    pub runner_check_mode: Option<bool>,
    pub validate_certs: Option<bool>,
    /// Per-request timeout in seconds.
    pub timeout: Option<u64>,
}

/// Validated inputs for one reconciliation run.
#[derive(Debug)]
pub struct RunSpec {
    pub endpoint: RemoteEndpoint,
    pub config: TransportConfig,
    pub desired: DesiredState,
    pub check_mode: bool,
}

impl ModuleParams {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read argument file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid argument file {}", path.display()))
    }

    /// Fill every field that is unset here from `fallback`.
    pub fn or(self, fallback: ModuleParams) -> ModuleParams {
        ModuleParams {
            url: self.url.or(fallback.url),
            token: self.token.or(fallback.token),
            name: self.name.or(fallback.name),
            description: self.description.or(fallback.description),
            state: self.state.or(fallback.state),
            check_mode: self.check_mode.or(fallback.check_mode),
            runner_check_mode: self.runner_check_mode.or(fallback.runner_check_mode),
            validate_certs: self.validate_certs.or(fallback.validate_certs),
            timeout: self.timeout.or(fallback.timeout),
        }
    }

    pub fn resolve(self) -> sonarsync_core::Result<RunSpec> {
        let url = required(self.url, "url")?;
        let token = Token::new(required(self.token, "token")?)?;
        let key = ResourceKey::new(required(self.name, "name")?)?;

        let mut desired = match self.state.unwrap_or_default() {
            Presence::Present => DesiredState::present(key),
            Presence::Absent => DesiredState::absent(key),
        };
        if let Some(description) = self.description {
            desired = desired.with_attribute(DESCRIPTION, description);
        }

        let mut config = TransportConfig::default();
        if let Some(verify) = self.validate_certs {
            config.verify_tls = verify;
        }
        if let Some(secs) = self.timeout {
            if secs == 0 {
                return Err(Error::InvalidInput("timeout must be at least 1 second".into()));
            }
            config.timeout = Duration::from_secs(secs);
        }

        let check_mode =
            self.check_mode.unwrap_or(false) || self.runner_check_mode.unwrap_or(false);
        Ok(RunSpec {
            endpoint: RemoteEndpoint::new(&url, token)?,
            config,
            desired,
            check_mode,
        })
    }
}

fn required(value: Option<String>, field: &str) -> sonarsync_core::Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidInput(format!(
            "missing required parameter '{field}'"
        ))),
    }
}
