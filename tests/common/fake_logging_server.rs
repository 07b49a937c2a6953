//! A REST logging backend on a loopback port, for exercising the HTTP client.
//!
//! | route                           | behaviour                                   |
//! |---------------------------------|---------------------------------------------|
//! | `GET  /v2/projects/{p}/logs`    | one log name                                |
//! | `POST /v2/entries:list`         | pages of scripted history                   |
//! | `POST /v2/entries:tail`         | streamed JSON array fed by `push_tail`      |
//! | `POST /token`                   | OAuth token endpoint                        |
//!
//! Every `/v2` route requires `Authorization: Bearer <token>`.

use super::fake_logging_api::page_of;
use axum::body::{Body, Bytes};
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct ServerState {
    token: String,
    history: Vec<Value>,
    list_bodies: Vec<Value>,
    tail_bodies: Vec<Value>,
    token_forms: Vec<HashMap<String, String>>,
    issued_token: Option<String>,
    tail_rx: Option<mpsc::UnboundedReceiver<String>>,
}

type Shared = Arc<Mutex<ServerState>>;

pub struct FakeLoggingServer {
    pub endpoint: String,
    state: Shared,
    tail_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    first_batch: Mutex<bool>,
}

impl FakeLoggingServer {
    /// Bind on `127.0.0.1:0` and serve until the test's runtime shuts down.
    pub async fn start(token: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state: Shared = Arc::new(Mutex::new(ServerState {
            token: token.to_string(),
            tail_rx: Some(rx),
            ..ServerState::default()
        }));
        let app = Router::new()
            .route("/v2/projects/{project}/logs", get(list_logs))
            .route("/v2/entries:list", post(list_entries))
            .route("/v2/entries:tail", post(tail_entries))
            .route("/token", post(issue_token))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            endpoint: format!("http://{addr}"),
            state,
            tail_tx: Mutex::new(Some(tx)),
            first_batch: Mutex::new(true),
        }
    }

    pub fn add_history(&self, entries: impl IntoIterator<Item = Value>) {
        self.state.lock().unwrap().history.extend(entries);
    }

    /// What the token endpoint hands out on its next call.
    pub fn issue_token(&self, token: &str) {
        self.state.lock().unwrap().issued_token = Some(token.to_string());
    }

    pub fn push_tail(&self, entries: Vec<Value>) {
        let mut first = self.first_batch.lock().unwrap();
        let sep = if *first { "" } else { "\n," };
        *first = false;
        let chunk = format!("{sep}{}", json!({"entries": entries}));
        self.send_raw(&chunk);
    }

    /// Write raw bytes into the tail body, e.g. to split a message.
    pub fn send_raw(&self, chunk: &str) {
        if let Some(tx) = self.tail_tx.lock().unwrap().as_ref() {
            let _ = tx.send(chunk.to_string());
        }
    }

    /// Close the array and end the response.
    pub fn end_tail(&self) {
        self.send_raw("\n]");
        self.tail_tx.lock().unwrap().take();
    }

    pub fn list_bodies(&self) -> Vec<Value> {
        self.state.lock().unwrap().list_bodies.clone()
    }

    pub fn tail_bodies(&self) -> Vec<Value> {
        self.state.lock().unwrap().tail_bodies.clone()
    }

    pub fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.state.lock().unwrap().token_forms.clone()
    }
}

fn authorized(state: &Shared, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", state.lock().unwrap().token);
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"error": {"code": 403, "message": "caller lacks logging.entries.list", "status": "PERMISSION_DENIED"}})),
    )
        .into_response()
}

async fn list_logs(State(state): State<Shared>, Path(project): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    Json(json!({"logNames": [format!("projects/{project}/logs/app")]})).into_response()
}

async fn list_entries(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    let mut s = state.lock().unwrap();
    s.list_bodies.push(body.clone());
    let page = page_of(
        &s.history,
        body["filter"].as_str().unwrap_or_default(),
        body["pageSize"].as_u64().unwrap_or(100) as u32,
        body["pageToken"].as_str(),
    );
    Json(json!({
        "entries": page.entries,
        "nextPageToken": page.next_page_token.unwrap_or_default(),
    }))
    .into_response()
}

async fn tail_entries(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&state, &headers) {
        return denied();
    }
    let rx = {
        let mut s = state.lock().unwrap();
        s.tail_bodies.push(body);
        s.tail_rx.take()
    };
    let Some(rx) = rx else {
        return (StatusCode::CONFLICT, "tail already open").into_response();
    };
    let head = futures::stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"[")) });
    let rest = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, std::io::Error>(Bytes::from(chunk)), rx))
    });
    Response::builder()
        .header("content-type", "application/json")
        .body(Body::from_stream(futures::StreamExt::chain(head, rest)))
        .unwrap()
}

async fn issue_token(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    let mut s = state.lock().unwrap();
    s.token_forms.push(form);
    match s.issued_token.clone() {
        Some(token) => Json(json!({
            "access_token": token,
            "expires_in": 3599,
            "token_type": "Bearer",
        }))
        .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Bad Request"})),
        )
            .into_response(),
    }
}
