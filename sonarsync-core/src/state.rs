//! Desired and observed resource state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique human-readable name of a resource within its collection.
///
/// Uniqueness is enforced by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidInput("resource name must not be empty".to_string()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the resource should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

impl FromStr for Presence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Presence::Present),
            "absent" => Ok(Presence::Absent),
            other => Err(Error::InvalidInput(format!(
                "invalid state '{other}', expected 'present' or 'absent'"
            ))),
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Present => f.write_str("present"),
            Presence::Absent => f.write_str("absent"),
        }
    }
}

/// Caller-declared target for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub key: ResourceKey,
    pub attributes: BTreeMap<String, String>,
    pub presence: Presence,
}

impl DesiredState {
    pub fn present(key: ResourceKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
            presence: Presence::Present,
        }
    }

    pub fn absent(key: ResourceKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
            presence: Presence::Absent,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A resource as currently reported by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedState {
    pub key: ResourceKey,
    pub remote_id: RemoteId,
    pub attributes: BTreeMap<String, String>,
}

/// What a reconciliation decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Delete,
    NoOp,
}

impl Action {
    pub fn changes(self) -> bool {
        !matches!(self, Action::NoOp)
    }
}

/// Decision for one desired state against the current remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub action: Action,
    pub observed: Option<ObservedState>,
}

impl Plan {
    /// Map (observed, desired presence) to the single converging action.
    pub fn decide(observed: Option<ObservedState>, presence: Presence) -> Self {
        let action = match (&observed, presence) {
            (Some(_), Presence::Present) => Action::NoOp,
            (None, Presence::Present) => Action::Create,
            (Some(_), Presence::Absent) => Action::Delete,
            (None, Presence::Absent) => Action::NoOp,
        };
        Self { action, observed }
    }
}

/// Result of one reconciliation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub action: Action,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
}
