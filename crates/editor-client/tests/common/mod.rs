//! In-process fake of the editor API: login, sub-auth, an SSE push stream
//! fed from a test-controlled channel, skills, and state endpoints.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ea_domain::config::{EditorConfig, StreamConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

pub enum Push {
    Event { id: String, data: String },
    Ping,
    /// End the current SSE response.
    Disconnect,
}

pub struct FakeState {
    pub logins: AtomicU32,
    pub login_bodies: Mutex<Vec<Value>>,
    pub login_api_keys: Mutex<Vec<String>>,
    valid_token: Mutex<String>,
    pub reject_all: AtomicBool,

    pub sub_auths: AtomicU32,
    pub sub_auth_bodies: Mutex<Vec<Value>>,
    pub fail_sub_auth: AtomicBool,
    pub ping_interval: Mutex<Option<f64>>,

    pub connections: AtomicU32,
    conn_gen: watch::Sender<u32>,
    pub stream_status: AtomicU16,
    pub last_event_ids: Mutex<Vec<Option<String>>>,
    push_tx: mpsc::UnboundedSender<Push>,
    push_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Push>>,
    event_seq: AtomicU32,

    state_seq: AtomicU32,
    pub skills: Mutex<Vec<(String, Value)>>,
    pub meta: Mutex<HashMap<String, Value>>,
    pub meta_hits: Mutex<HashMap<String, u32>>,
}

pub struct FakeEditor {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
}

impl FakeEditor {
    pub async fn start() -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (conn_gen, _) = watch::channel(0);
        let state = Arc::new(FakeState {
            logins: AtomicU32::new(0),
            login_bodies: Mutex::new(Vec::new()),
            login_api_keys: Mutex::new(Vec::new()),
            valid_token: Mutex::new(String::new()),
            reject_all: AtomicBool::new(false),
            sub_auths: AtomicU32::new(0),
            sub_auth_bodies: Mutex::new(Vec::new()),
            fail_sub_auth: AtomicBool::new(false),
            ping_interval: Mutex::new(None),
            connections: AtomicU32::new(0),
            conn_gen,
            stream_status: AtomicU16::new(200),
            last_event_ids: Mutex::new(Vec::new()),
            push_tx,
            push_rx: tokio::sync::Mutex::new(push_rx),
            event_seq: AtomicU32::new(0),
            state_seq: AtomicU32::new(0),
            skills: Mutex::new(Vec::new()),
            meta: Mutex::new(HashMap::new()),
            meta_hits: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/editor/auth/login", post(login))
            .route("/editor/auth/me", get(me))
            .route("/editor/sub-auth", post(sub_auth))
            .route("/editor/sub/:token", get(subscribe))
            .route("/editor/skills/*path", post(skill))
            .route("/editor/state/upload", post(upload))
            .route("/editor/state/create", post(upload))
            .route("/editor/state/meta/:id", get(meta))
            .route("/editor/state/image/:id", get(image))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Session config pointed at this server, with fast retry timings.
    pub fn config(&self) -> EditorConfig {
        EditorConfig {
            base_url: format!("http://{}/editor", self.addr),
            credentials: Some("tester@example.com:s3cret".into()),
            timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            unknown_state_retries: 1,
            unknown_state_retry_ms: 10,
            stream: StreamConfig {
                max_failures: 3,
                backoff_base_ms: 5,
                backoff_exponent: 1.5,
                max_jitter_ms: 5,
                max_backoff_ms: 50,
                heartbeat_grace_ms: 50,
            },
            ..EditorConfig::default()
        }
    }

    /// Queue a push event; it is delivered on the current (or next) stream.
    pub fn push_state(&self, state_id: &str, status: &str, credits_left: Option<i64>) -> String {
        let mut data = json!({ "state": state_id, "status": status });
        if let Some(credits) = credits_left {
            data["credits_left"] = json!(credits);
        }
        self.push_raw(&data.to_string())
    }

    pub fn push_raw(&self, data: &str) -> String {
        let id = (self.state.event_seq.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        self.state
            .push_tx
            .send(Push::Event {
                id: id.clone(),
                data: data.to_owned(),
            })
            .unwrap();
        id
    }

    pub fn ping(&self) {
        self.state.push_tx.send(Push::Ping).unwrap();
    }

    /// A detached heartbeat sender; returns `false` once the server is gone.
    pub fn pinger(&self) -> impl Fn() -> bool + Send + 'static {
        let tx = self.state.push_tx.clone();
        move || tx.send(Push::Ping).is_ok()
    }

    pub fn disconnect(&self) {
        self.state.push_tx.send(Push::Disconnect).unwrap();
    }

    /// Invalidate every token handed out so far.
    pub fn expire_tokens(&self) {
        *self.state.valid_token.lock() = "expired".into();
    }

    pub fn set_meta(&self, state_id: &str, meta: Value) {
        self.state.meta.lock().insert(state_id.to_owned(), meta);
    }

    pub fn meta_hits(&self, state_id: &str) -> u32 {
        self.state.meta_hits.lock().get(state_id).copied().unwrap_or(0)
    }

    pub fn connections(&self) -> u32 {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> u32 {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn skill_calls(&self) -> Vec<(String, Value)> {
        self.state.skills.lock().clone()
    }

    pub async fn wait_for_skills(&self, n: usize) {
        eventually(|| self.state.skills.lock().len() >= n).await;
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── handlers ────────────────────────────────────────────────────────

fn authorized(state: &FakeState, headers: &HeaderMap) -> bool {
    if state.reject_all.load(Ordering::SeqCst) {
        return false;
    }
    let expected = format!("Bearer {}", state.valid_token.lock());
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "token expired" }))).into_response()
}

async fn login(State(state): State<Arc<FakeState>>, headers: HeaderMap, body: Bytes) -> Response {
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.login_bodies.lock().push(body);
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        state.login_api_keys.lock().push(key.to_owned());
    }

    let token = format!("tok-{n}");
    *state.valid_token.lock() = token.clone();
    Json(json!({ "token": token, "user": { "credits": 100 } })).into_response()
}

async fn me(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    Json(json!({ "credits": 77 })).into_response()
}

async fn sub_auth(State(state): State<Arc<FakeState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let n = state.sub_auths.fetch_add(1, Ordering::SeqCst) + 1;
    state
        .sub_auth_bodies
        .lock()
        .push(serde_json::from_slice(&body).unwrap_or(Value::Null));
    if state.fail_sub_auth.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "sub-auth down").into_response();
    }
    let ping_interval = *state.ping_interval.lock();
    Json(json!({ "token": format!("sub-{n}"), "ping_interval": ping_interval })).into_response()
}

async fn subscribe(
    State(state): State<Arc<FakeState>>,
    Path(_token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let n = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let last_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.last_event_ids.lock().push(last_id);

    let status = state.stream_status.load(Ordering::SeqCst);
    if status != 200 {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (code, "stream unavailable").into_response();
    }

    // A newer connection takes over the push channel.
    state.conn_gen.send_replace(n);
    let mut gen_rx = state.conn_gen.subscribe();

    let stream = async_stream::stream! {
        let mut rx = state.push_rx.lock().await;
        loop {
            let next = tokio::select! {
                msg = rx.recv() => msg,
                _ = gen_rx.wait_for(|g| *g != n) => None,
            };
            match next {
                Some(Push::Event { id, data }) => {
                    yield Ok::<_, Infallible>(Event::default().id(id).data(data));
                }
                Some(Push::Ping) => yield Ok(Event::default().event("ping").data("")),
                Some(Push::Disconnect) | None => break,
            }
        }
    };
    Sse::new(stream).into_response()
}

async fn skill(
    State(state): State<Arc<FakeState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let st = next_state(&state);
    state.skills.lock().push((path, body));
    Json(json!({ "state": st })).into_response()
}

async fn upload(State(state): State<Arc<FakeState>>, headers: HeaderMap, _body: Bytes) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let st = next_state(&state);
    Json(json!({ "state": st })).into_response()
}

fn next_state(state: &FakeState) -> String {
    format!("st_{}", state.state_seq.fetch_add(1, Ordering::SeqCst) + 1)
}

async fn meta(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    *state.meta_hits.lock().entry(id.clone()).or_default() += 1;
    match state.meta.lock().get(&id) {
        Some(meta) => Json(meta.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "not found" }))).into_response(),
    }
}

async fn image(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let format = q.get("format").cloned().unwrap_or_default();
    let resolution = q.get("resolution").cloned().unwrap_or_default();
    format!("IMG:{id}:{format}:{resolution}").into_response()
}
