//! In-process mock of the SonarQube user group API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use sonarsync_core::sonarqube::UserGroups;
use sonarsync_core::{HttpTransport, Reconciler, RemoteEndpoint, Token, TransportConfig};

pub const TOKEN: &str = "squ_test";
/// `Basic base64("squ_test:")`: token as user name, empty password.
const EXPECTED_AUTH: &str = "Basic c3F1X3Rlc3Q6";

#[derive(Debug, Clone)]
pub struct MockGroup {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Remote state plus knobs for failure injection.
#[derive(Default)]
pub struct MockState {
    pub groups: Mutex<Vec<MockGroup>>,
    next_id: AtomicUsize,
    pub searches: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Answer every group route with 403.
    pub deny: AtomicBool,
    /// Omit real groups from search results (stale read).
    pub hide_from_search: AtomicBool,
    /// Names returned by search that do not exist for delete.
    pub ghosts: Mutex<Vec<String>>,
}

impl MockState {
    pub fn insert(&self, name: &str) -> String {
        let id = format!("AX{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.groups.lock().unwrap().push(MockGroup {
            id: id.clone(),
            name: name.to_string(),
            description: None,
        });
        id
    }

    pub fn names(&self) -> Vec<String> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .map(|g| g.name.clone())
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<MockGroup> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.name == name)
            .cloned()
    }

    fn gate(&self, headers: &HeaderMap) -> Result<(), Response> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if auth != Some(EXPECTED_AUTH) {
            return Err(StatusCode::UNAUTHORIZED.into_response());
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(error(StatusCode::FORBIDDEN, "Insufficient privileges"));
        }
        Ok(())
    }
}

fn error(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "errors": [{ "msg": msg }] }))).into_response()
}

fn group_json(g: &MockGroup) -> Value {
    json!({
        "id": g.id,
        "name": g.name,
        "description": g.description,
        "membersCount": 0,
        "default": false,
    })
}

async fn search_groups(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.searches.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.gate(&headers) {
        return resp;
    }

    let q = params.get("q").cloned().unwrap_or_default();
    let ps: usize = params.get("ps").and_then(|v| v.parse().ok()).unwrap_or(100);
    let p: usize = params.get("p").and_then(|v| v.parse().ok()).unwrap_or(1);

    let mut matches: Vec<Value> = Vec::new();
    if !state.hide_from_search.load(Ordering::SeqCst) {
        matches.extend(
            state
                .groups
                .lock()
                .unwrap()
                .iter()
                .filter(|g| g.name.contains(&q))
                .map(group_json),
        );
    }
    for ghost in state.ghosts.lock().unwrap().iter() {
        matches.push(json!({ "id": format!("ghost-{ghost}"), "name": ghost }));
    }

    let total = matches.len();
    let page: Vec<Value> = matches.into_iter().skip((p - 1) * ps).take(ps).collect();
    Json(json!({
        "paging": { "pageIndex": p, "pageSize": ps, "total": total },
        "groups": page,
    }))
    .into_response()
}

async fn create_group(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.creates.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.gate(&headers) {
        return resp;
    }

    let Some(name) = form.get("name") else {
        return error(StatusCode::BAD_REQUEST, "The 'name' parameter is missing");
    };
    if state.find(name).is_some() {
        return error(
            StatusCode::CONFLICT,
            &format!("Group '{name}' already exists"),
        );
    }

    let id = state.insert(name);
    let mut groups = state.groups.lock().unwrap();
    let group = groups
        .iter_mut()
        .find(|g| g.id == id)
        .expect("group just inserted");
    group.description = form.get("description").cloned();
    Json(json!({ "group": group_json(group) })).into_response()
}

async fn delete_group(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.deletes.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.gate(&headers) {
        return resp;
    }

    let id = form.get("id").cloned().unwrap_or_default();
    let mut groups = state.groups.lock().unwrap();
    let before = groups.len();
    groups.retain(|g| g.id != id);
    if groups.len() == before {
        return error(
            StatusCode::NOT_FOUND,
            &format!("No group with id '{id}'"),
        );
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn plain_text() -> Response {
    (StatusCode::OK, "pong").into_response()
}

async fn empty_body() -> Response {
    StatusCode::OK.into_response()
}

async fn fail_with(Path(status): Path<u16>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error(status, "forced failure")
}

async fn echo_form(Form(form): Form<HashMap<String, String>>) -> Response {
    Json(json!(form)).into_response()
}

/// Mock server bound to an ephemeral local port.
pub struct MockSonar {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl MockSonar {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());

        let router = Router::new()
            .route("/api/user_groups/search", get(search_groups))
            .route("/api/user_groups/create", post(create_group))
            .route("/api/user_groups/delete", post(delete_group))
            .route("/api/plain", get(plain_text))
            .route("/api/empty", get(empty_body))
            .route("/api/fail/{status}", get(fail_with))
            .route("/api/echo", post(echo_form).put(echo_form))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn transport_with_token(&self, token: &str) -> HttpTransport {
        let endpoint =
            RemoteEndpoint::new(&self.base_url(), Token::new(token).unwrap()).unwrap();
        HttpTransport::new(endpoint, &TransportConfig::default()).unwrap()
    }

    pub fn transport(&self) -> HttpTransport {
        self.transport_with_token(TOKEN)
    }

    pub fn groups(&self) -> Reconciler<UserGroups> {
        Reconciler::new(Arc::new(self.transport()), UserGroups::new())
    }

    pub fn count(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
