//! SonarQube user groups (`/api/user_groups/*`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::reconciler::ResourceKind;
use crate::state::{DesiredState, ObservedState, RemoteId, ResourceKey};
use crate::transport::{Call, Method, Payload, Transport};

const SEARCH_PATH: &str = "/api/user_groups/search";
const CREATE_PATH: &str = "/api/user_groups/create";
const DELETE_PATH: &str = "/api/user_groups/delete";

/// Attribute carrying the group description.
pub const DESCRIPTION: &str = "description";

const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    paging: Option<Paging>,
    #[serde(default)]
    groups: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    id: Value,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    group: CreatedGroup,
}

#[derive(Debug, Deserialize)]
struct CreatedGroup {
    #[serde(default)]
    id: Option<Value>,
}

/// Older servers return numeric ids, newer ones UUID strings.
fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// User groups, keyed by group name.
#[derive(Debug, Clone)]
pub struct UserGroups {
    page_size: u32,
}

impl Default for UserGroups {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl UserGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page size for searches. SonarQube caps this at 500.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 500);
        self
    }

    fn observed(entry: GroupEntry) -> Result<ObservedState> {
        let id = id_string(&entry.id).ok_or_else(|| {
            Error::malformed(
                Method::Get,
                SEARCH_PATH,
                format!("group '{}' has no usable id", entry.name),
            )
        })?;
        let mut attributes = BTreeMap::new();
        if let Some(description) = entry.description {
            attributes.insert(DESCRIPTION.to_string(), description);
        }
        Ok(ObservedState {
            key: ResourceKey::new(entry.name).map_err(|e| {
                Error::malformed(Method::Get, SEARCH_PATH, format!("invalid group name: {e}"))
            })?,
            remote_id: RemoteId(id),
            attributes,
        })
    }
}

#[async_trait]
impl ResourceKind for UserGroups {
    fn noun(&self) -> &'static str {
        "group"
    }

    fn search_path(&self) -> &'static str {
        SEARCH_PATH
    }

    async fn search(
        &self,
        transport: &dyn Transport,
        key: &ResourceKey,
    ) -> Result<Vec<ObservedState>> {
        let mut found = Vec::new();
        let mut seen: u64 = 0;
        let mut page: u32 = 1;

        loop {
            let call = Call::get(SEARCH_PATH)
                .param("q", key.as_str())
                .param("ps", self.page_size.to_string())
                .param("p", page.to_string())
                .accept(&[200]);
            let value = match transport.invoke(call).await? {
                Payload::Json(value) => value,
                other => {
                    return Err(Error::malformed(
                        Method::Get,
                        SEARCH_PATH,
                        format!("expected a JSON group list, got {other:?}"),
                    ));
                }
            };
            let result: SearchPage = serde_json::from_value(value).map_err(|e| {
                Error::malformed(Method::Get, SEARCH_PATH, format!("invalid group list: {e}"))
            })?;

            let count = result.groups.len();
            seen += count as u64;
            // Fuzzy neighbours are dropped unparsed; a malformed one must not
            // fail the lookup of an unrelated name.
            for entry in result.groups {
                if entry.name == key.as_str() {
                    found.push(Self::observed(entry)?);
                }
            }

            // Without paging info only a short page proves the end.
            let more = match result.paging {
                Some(paging) => seen < paging.total,
                None => true,
            };
            debug!(page, count, more, "Fetched group search page");
            if count == 0 || count < self.page_size as usize || !more {
                break;
            }
            page += 1;
        }

        Ok(found)
    }

    async fn create(
        &self,
        transport: &dyn Transport,
        desired: &DesiredState,
    ) -> Result<Option<RemoteId>> {
        let mut call = Call::post(CREATE_PATH)
            .param("name", desired.key.as_str())
            .accept(&[200, 201]);
        if let Some(description) = desired.attribute(DESCRIPTION) {
            call = call.param(DESCRIPTION, description);
        }

        let payload = transport.invoke(call).await?;
        let id = payload
            .as_json()
            .and_then(|v| serde_json::from_value::<CreateResponse>(v.clone()).ok())
            .and_then(|r| r.group.id)
            .and_then(|id| id_string(&id))
            .map(RemoteId);
        Ok(id)
    }

    async fn delete(&self, transport: &dyn Transport, observed: &ObservedState) -> Result<()> {
        let call = Call::post(DELETE_PATH)
            .param("id", observed.remote_id.0.as_str())
            .accept(&[200, 204]);
        transport.invoke(call).await?;
        Ok(())
    }
}
