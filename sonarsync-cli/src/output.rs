//! Result document printed for the automation runner.

use serde::Serialize;

use sonarsync_core::{Action, Error, ErrorKind, Outcome, RemoteId};

#[derive(Debug, Serialize)]
pub struct ModuleResult {
    pub changed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ModuleResult {
    pub fn success(outcome: Outcome) -> Self {
        Self {
            changed: outcome.changed,
            failed: false,
            msg: outcome.message,
            action: Some(outcome.action),
            id: outcome.remote_id,
            error_kind: None,
            status: None,
        }
    }

    pub fn failure(err: &Error) -> Self {
        Self {
            changed: false,
            failed: true,
            msg: err.to_string(),
            action: None,
            id: None,
            error_kind: Some(err.kind()),
            status: err.failure().and_then(|f| f.status),
        }
    }

    /// Process exit status: 0 on success, 2 for rejected input, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match (self.failed, self.error_kind) {
            (false, _) => 0,
            (true, Some(ErrorKind::InvalidInput)) => 2,
            (true, _) => 1,
        }
    }
}
