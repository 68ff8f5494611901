//! The editor API session.
//!
//! [`EditorContext`] authenticates, submits skills, and correlates push
//! events back to the callers awaiting them. One background pump task reads
//! the [`ResilientEventSource`] and is the only writer of the futures
//! registry; any number of tasks may await states concurrently.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ea_domain::config::{Credentials, EditorConfig};
use ea_domain::error::{Error, Result};
use ea_domain::stream::BoxStream;
use ea_domain::trace::{ResolvedVia, TraceEvent};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::{from_reqwest, SharedClient};
use crate::event_source::{ResilientEventSource, Subscription, SubscriptionAuth};
use crate::registry::{FuturesRegistry, Resolution};
use crate::retry::BackoffPolicy;
use crate::skills::Skills;
use crate::types::{
    ErrorResult, ImageOutParams, JobStatus, LoginResponse, PushEvent, StateAccepted, StateId,
    SubAuthResponse, UserInfo,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    credits: Option<i64>,
}

#[derive(Debug, Clone)]
enum PumpStatus {
    Running,
    Stopped(Arc<Error>),
    Cancelled,
}

impl PumpStatus {
    fn is_running(&self) -> bool {
        matches!(self, PumpStatus::Running)
    }
}

struct Pump {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    status: watch::Receiver<PumpStatus>,
}

struct ContextInner {
    config: EditorConfig,
    base_url: String,
    credentials: Option<Credentials>,
    http: Arc<SharedClient>,
    auth: parking_lot::Mutex<AuthState>,
    login_lock: tokio::sync::Mutex<()>,
    registry: parking_lot::Mutex<FuturesRegistry<PushEvent>>,
    pump: parking_lot::Mutex<Option<Pump>>,
}

impl ContextInner {
    /// Pump-side handling of one decoded push event.
    fn route(&self, event: PushEvent) {
        if let Some(credits) = event.credits_left {
            self.auth.lock().credits = Some(credits);
            TraceEvent::CreditsUpdated { credits }.emit();
        }

        let state_id = event.state.clone();
        match self.registry.lock().resolve(&state_id, event) {
            Resolution::Resolved => tracing::debug!(state_id = %state_id, "state resolved"),
            Resolution::Duplicate => {
                tracing::debug!(state_id = %state_id, "duplicate push event ignored")
            }
            Resolution::Stale => {
                tracing::debug!(state_id = %state_id, "push event for completed state dropped")
            }
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.cancel.cancel();
        }
    }
}

/// A file to hand to `state/create` or `state/upload`.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes { data: Vec<u8>, file_name: String },
    Url(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EditorContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct EditorContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for EditorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorContext")
            .field("base_url", &self.inner.base_url)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

impl EditorContext {
    pub fn new(config: EditorConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(Error::Config("editor.base_url must not be empty".into()));
        }
        let credentials = config
            .credentials
            .as_deref()
            .map(Credentials::parse)
            .transpose()?;
        let http = Arc::new(SharedClient::new(
            config.request_timeout(),
            config.user_agent.clone(),
        ));
        let registry = FuturesRegistry::new(config.futures_capacity);

        Ok(Self {
            inner: Arc::new(ContextInner {
                config,
                base_url,
                credentials,
                http,
                auth: parking_lot::Mutex::new(AuthState::default()),
                login_lock: tokio::sync::Mutex::new(()),
                registry: parking_lot::Mutex::new(registry),
                pump: parking_lot::Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.inner.config
    }

    pub fn token(&self) -> Option<String> {
        self.inner.auth.lock().token.clone()
    }

    /// Last known credit balance, from login, `me()` or a push event.
    pub fn credits(&self) -> Option<i64> {
        self.inner.auth.lock().credits
    }

    /// Number of registry entries still awaiting resolution or removal.
    pub fn pending_states(&self) -> usize {
        self.inner.registry.lock().len()
    }

    pub fn is_tracking(&self, state_id: &str) -> bool {
        self.inner.registry.lock().contains(state_id)
    }

    pub fn skills(&self) -> Skills<'_> {
        Skills::new(self)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    // ── authentication ──────────────────────────────────────────────

    /// Exchange the configured credentials for a bearer token. Safe to call
    /// again at any time to refresh it.
    pub async fn login(&self) -> Result<()> {
        let _guard = self.inner.login_lock.lock().await;
        self.post_login().await
    }

    /// Log in unless another task replaced `seen` while this one waited
    /// for the login lock. `seen` is the rejected token, or `None` when
    /// there was none yet.
    async fn renew_login(&self, seen: Option<String>) -> Result<()> {
        let _guard = self.inner.login_lock.lock().await;
        if self.token().is_some() && self.token() != seen {
            tracing::debug!("token already renewed by a concurrent call");
            return Ok(());
        }
        self.post_login().await
    }

    async fn post_login(&self) -> Result<()> {
        let creds = self
            .inner
            .credentials
            .as_ref()
            .ok_or_else(|| Error::Auth("no credentials configured".into()))?;

        let lease = self.inner.http.acquire()?;

        let rb = lease
            .post(self.url("auth/login"))
            .header("X-Request-Id", Uuid::new_v4().to_string());
        let rb = match creds {
            Credentials::UserPassword { user, password } => {
                rb.json(&serde_json::json!({ "username": user, "password": password }))
            }
            Credentials::ApiKey(key) => rb
                .header("X-API-Key", key)
                .json(&serde_json::json!({})),
        };

        let start = Instant::now();
        let resp = rb.send().await.map_err(from_reqwest)?;
        TraceEvent::ApiCall {
            endpoint: "POST auth/login".into(),
            status: resp.status().as_u16(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();

        let status = resp.status();
        let body = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Auth(format!("login failed ({}): {body}", status.as_u16())));
        }
        let login: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("failed to parse login response: {e}")))?;

        let mut auth = self.inner.auth.lock();
        auth.token = Some(login.token);
        if let Some(credits) = login.user.and_then(|u| u.credits) {
            auth.credits = Some(credits);
        }
        tracing::info!(credits = ?auth.credits, "logged in to editor API");
        Ok(())
    }

    /// GET auth/me, refreshing the cached credit balance.
    pub async fn me(&self) -> Result<UserInfo> {
        let me: UserInfo = self.request_json(Method::GET, "auth/me", |rb| rb).await?;
        if let Some(credits) = me.credits {
            self.inner.auth.lock().credits = Some(credits);
        }
        Ok(me)
    }

    // ── requests ────────────────────────────────────────────────────

    /// Issue an authenticated call. A `401` triggers one re-login and one
    /// retry; a second `401` is an [`Error::Auth`]. With `check_status`,
    /// any other non-2xx response becomes [`Error::Status`].
    pub async fn request<F>(
        &self,
        method: Method,
        path: &str,
        check_status: bool,
        build: F,
    ) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send,
    {
        let lease = self.inner.http.acquire()?;
        if self.token().is_none() {
            self.renew_login(None).await?;
        }

        let url = self.url(path);
        let endpoint = format!("{method} {path}");
        let mut renewed = false;

        loop {
            let token = self.token().unwrap_or_default();
            let rb = build(lease.request(method.clone(), &url))
                .bearer_auth(&token)
                .header("X-Request-Id", Uuid::new_v4().to_string());

            let start = Instant::now();
            let resp = rb.send().await.map_err(from_reqwest)?;
            let status = resp.status();
            TraceEvent::ApiCall {
                endpoint: endpoint.clone(),
                status: status.as_u16(),
                duration_ms: start.elapsed().as_millis() as u64,
            }
            .emit();

            if status == StatusCode::UNAUTHORIZED {
                if !renewed {
                    renewed = true;
                    tracing::info!(endpoint = %endpoint, "token rejected, logging in again");
                    self.renew_login(Some(token)).await?;
                    continue;
                }
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Auth(format!(
                    "{endpoint} still unauthorized after re-login: {body}"
                )));
            }

            if check_status && !status.is_success() {
                return Err(status_error(&method, path, resp).await);
            }
            return Ok(resp);
        }
    }

    async fn request_json<T, F>(&self, method: Method, path: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder + Send,
    {
        let resp = self.request(method, path, true, build).await?;
        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("failed to parse {path} response: {e}: {body}")))
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let body = match &self.inner.config.subscription_topic {
            Some(topic) => serde_json::json!({ "topic": topic }),
            None => serde_json::json!({}),
        };
        let sub: SubAuthResponse = self
            .request_json(Method::POST, "sub-auth", |rb| rb.json(&body))
            .await?;
        let ping_interval = sub
            .ping_interval
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        Ok(Subscription {
            url: self.url(&format!("sub/{}", sub.token)),
            ping_interval,
        })
    }

    // ── push stream lifecycle ───────────────────────────────────────

    /// Spawn the pump and wait until the event stream is connected. If the
    /// stream fails for good before that, the pump is torn down and its
    /// terminal error returned.
    pub async fn stream_start(&self) -> Result<()> {
        let (mut active, mut status) = {
            let mut slot = self.inner.pump.lock();
            // A pump that already died on its own may be replaced.
            if slot.as_ref().is_some_and(|p| p.status.borrow().is_running()) {
                return Err(Error::StreamAlreadyRunning);
            }

            let cfg = &self.inner.config;
            let auth: Arc<dyn SubscriptionAuth> = Arc::new(ContextSubscriber {
                inner: Arc::downgrade(&self.inner),
            });
            let mut source = ResilientEventSource::new(
                auth,
                BackoffPolicy::from(&cfg.stream),
                cfg.stream.heartbeat_grace(),
                cfg.user_agent.as_deref(),
            )?;
            source.reset();
            let active = source.active_signal();

            let (status_tx, status_rx) = watch::channel(PumpStatus::Running);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(run_pump(
                Arc::downgrade(&self.inner),
                source.into_stream(),
                cancel.clone(),
                status_tx,
            ));
            *slot = Some(Pump {
                task,
                cancel,
                status: status_rx.clone(),
            });
            (active, status_rx)
        };

        let became_active = tokio::select! {
            biased;
            res = active.wait_for(|up| *up) => res.is_ok(),
            _ = status.wait_for(|s| !s.is_running()) => false,
        };
        if became_active {
            tracing::info!("event stream started");
            return Ok(());
        }

        let _ = status.wait_for(|s| !s.is_running()).await.map(|_| ());
        let terminal = status.borrow().clone();
        let pump = self.inner.pump.lock().take();
        if let Some(pump) = pump {
            pump.cancel.cancel();
            let _ = pump.task.await;
        }
        drop(status);
        Err(match terminal {
            PumpStatus::Stopped(e) => unshare(e),
            PumpStatus::Running | PumpStatus::Cancelled => Error::StreamCancelled,
        })
    }

    /// Cancel the pump and wait for it to finish. The session can be
    /// restarted afterwards.
    pub async fn stream_stop(&self) -> Result<()> {
        let Some(pump) = self.inner.pump.lock().take() else {
            return Err(Error::StreamNotStarted);
        };
        pump.cancel.cancel();
        match pump.task.await {
            Ok(()) => {
                tracing::info!("event stream stopped");
                Ok(())
            }
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::Other(format!("event pump panicked: {e}"))),
        }
    }

    /// Whether a pump exists and has not terminated.
    pub fn is_streaming(&self) -> bool {
        self.inner
            .pump
            .lock()
            .as_ref()
            .is_some_and(|p| p.status.borrow().is_running())
    }

    // ── state correlation ───────────────────────────────────────────

    /// Wait for `state_id` to finish. Races the registry future against the
    /// pump dying, bounded by `timeout` (the configured default when
    /// `None`). On timeout the state is polled directly once.
    pub async fn await_state(&self, state_id: &str, timeout: Option<Duration>) -> Result<JobStatus> {
        let mut status = match self.inner.pump.lock().as_ref() {
            Some(pump) => pump.status.clone(),
            None => return Err(Error::StreamNotStarted),
        };
        let future = self.inner.registry.lock().get(state_id);
        let limit = timeout.unwrap_or_else(|| self.inner.config.timeout());

        let waited = tokio::time::timeout(limit, async {
            tokio::select! {
                biased;
                event = future.wait() => Some(event),
                _ = status.wait_for(|s| !s.is_running()) => None,
            }
        })
        .await;

        match waited {
            Ok(Some(event)) => {
                self.inner.registry.lock().remove(state_id);
                TraceEvent::StateResolved {
                    state_id: state_id.to_owned(),
                    ok: event.status.is_ok(),
                    via: ResolvedVia::Stream,
                }
                .emit();
                Ok(event.status)
            }
            Ok(None) => {
                let terminal = status.borrow().clone();
                match terminal {
                    PumpStatus::Stopped(cause) => Err(Error::StreamDied {
                        state_id: state_id.to_owned(),
                        cause,
                    }),
                    PumpStatus::Running | PumpStatus::Cancelled => Err(Error::StreamCancelled),
                }
            }
            Err(_) => {
                tracing::warn!(
                    state_id,
                    timeout_ms = limit.as_millis() as u64,
                    "no push event in time, polling state"
                );
                self.poll_state(state_id, limit).await
            }
        }
    }

    async fn poll_state(&self, state_id: &str, waited: Duration) -> Result<JobStatus> {
        let path = format!("state/meta/{state_id}");
        let retries = self.inner.config.unknown_state_retries;
        let pause = Duration::from_millis(self.inner.config.unknown_state_retry_ms);
        let mut misses = 0u32;

        loop {
            let resp = self.request(Method::GET, &path, false, |rb| rb).await?;
            let status = resp.status();

            if status == StatusCode::NOT_FOUND {
                if misses >= retries {
                    self.inner.registry.lock().remove(state_id);
                    return Err(Error::UnknownState(state_id.to_owned()));
                }
                misses += 1;
                tracing::debug!(state_id, misses, "state not found yet");
                tokio::time::sleep(pause).await;
                continue;
            }
            if !status.is_success() {
                return Err(status_error(&Method::GET, &path, resp).await);
            }

            let body = resp.text().await.map_err(from_reqwest)?;
            let meta: Value = serde_json::from_str(&body)
                .map_err(|e| Error::Protocol(format!("failed to parse {path} response: {e}")))?;

            return match JobStatus::from_meta(&meta) {
                Some(job) => {
                    let settled = PushEvent {
                        state: state_id.to_owned(),
                        status: job,
                        credits_left: None,
                        extra: Default::default(),
                    };
                    self.inner.registry.lock().settle(state_id, settled);
                    TraceEvent::StateResolved {
                        state_id: state_id.to_owned(),
                        ok: job.is_ok(),
                        via: ResolvedVia::Poll,
                    }
                    .emit();
                    Ok(job)
                }
                None => Err(Error::StateTimeout {
                    state_id: state_id.to_owned(),
                    timeout_ms: waited.as_millis() as u64,
                }),
            };
        }
    }

    // ── skills ──────────────────────────────────────────────────────

    /// POST `skills/{path}` with the session priority merged under `params`,
    /// then await the resulting state.
    pub async fn call_skill(
        &self,
        path: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<(StateId, JobStatus)> {
        let mut body = serde_json::Map::new();
        body.insert(
            "priority".into(),
            Value::String(self.inner.config.priority.as_str().into()),
        );
        match params {
            Value::Object(map) => body.extend(map),
            Value::Null => {}
            other => {
                return Err(Error::Protocol(format!(
                    "skill params must be a JSON object, got {other}"
                )))
            }
        }

        let skill_path = format!("skills/{}", path.trim_start_matches('/'));
        let accepted: StateAccepted = self
            .request_json(Method::POST, &skill_path, |rb| rb.json(&body))
            .await?;
        tracing::debug!(state_id = %accepted.state, skill = path, "skill accepted");

        let status = self.await_state(&accepted.state, timeout).await?;
        Ok((accepted.state, status))
    }

    /// Like [`call_skill`](Self::call_skill) but turns `ko` into
    /// [`Error::JobFailed`] carrying the server's error message.
    pub async fn ensure_skill(
        &self,
        path: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<StateId> {
        let (state_id, status) = self.call_skill(path, params, timeout).await?;
        self.ensure_ok(state_id, status).await
    }

    async fn ensure_ok(&self, state_id: StateId, status: JobStatus) -> Result<StateId> {
        if status.is_ok() {
            return Ok(state_id);
        }
        let meta = self.get_meta(&state_id).await?;
        let failure = ErrorResult::from_meta(state_id, &meta);
        Err(Error::JobFailed {
            state_id: failure.state_id,
            message: failure.error,
        })
    }

    // ── states ──────────────────────────────────────────────────────

    pub async fn get_meta(&self, state_id: &str) -> Result<Value> {
        self.request_json(Method::GET, &format!("state/meta/{state_id}"), |rb| rb)
            .await
    }

    pub async fn get_image(&self, state_id: &str, params: ImageOutParams) -> Result<Vec<u8>> {
        let query = [
            ("format", params.format.as_str()),
            ("resolution", params.resolution.as_str()),
        ];
        let resp = self
            .request(
                Method::GET,
                &format!("state/image/{state_id}"),
                true,
                |rb| rb.query(&query),
            )
            .await?;
        let bytes = resp.bytes().await.map_err(from_reqwest)?;
        Ok(bytes.to_vec())
    }

    /// Create a state from a file or URL and wait until the server has
    /// processed it.
    pub async fn create_state(
        &self,
        source: &ImageSource,
        meta: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<StateId> {
        let meta = meta.map(Value::to_string);
        let accepted: StateAccepted = self
            .request_json(Method::POST, "state/create", |rb| {
                let mut form = source_form(source);
                if let Some(meta) = &meta {
                    form = form.text("meta", meta.clone());
                }
                rb.multipart(form)
            })
            .await?;
        let status = self.await_state(&accepted.state, timeout).await?;
        self.ensure_ok(accepted.state, status).await
    }

    /// Upload image bytes. The state id is returned as soon as the server
    /// accepts the upload; nothing is awaited.
    pub async fn upload_image(&self, data: Vec<u8>, file_name: &str) -> Result<StateId> {
        let source = ImageSource::Bytes {
            data,
            file_name: file_name.to_owned(),
        };
        let accepted: StateAccepted = self
            .request_json(Method::POST, "state/upload", |rb| {
                rb.multipart(source_form(&source))
            })
            .await?;
        Ok(accepted.state)
    }

    /// Log in if needed, start the stream, run `f`, and stop the stream
    /// whatever `f` returned.
    pub async fn run_one<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(EditorContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.token().is_none() {
            self.renew_login(None).await?;
        }
        self.stream_start().await?;
        let result = f(self.clone()).await;
        let stopped = self.stream_stop().await;
        let value = result?;
        stopped?;
        Ok(value)
    }
}

fn source_form(source: &ImageSource) -> Form {
    match source {
        ImageSource::Bytes { data, file_name } => Form::new().part(
            "file",
            Part::bytes(data.clone()).file_name(file_name.clone()),
        ),
        ImageSource::Url(url) => Form::new().text("file_url", url.clone()),
    }
}

/// Recover an owned error from the pump's shared terminal error.
fn unshare(e: Arc<Error>) -> Error {
    match Arc::try_unwrap(e) {
        Ok(e) => e,
        Err(shared) => match shared.as_ref() {
            Error::StreamStopped {
                failures,
                first_error,
                last_error,
            } => Error::StreamStopped {
                failures: *failures,
                first_error: first_error.clone(),
                last_error: last_error.clone(),
            },
            other => Error::Other(other.to_string()),
        },
    }
}

async fn status_error(method: &Method, path: &str, resp: Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Error::Status {
        method: method.to_string(),
        path: path.to_owned(),
        status,
        body,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pump
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Token exchange for the event source, without keeping the session alive.
struct ContextSubscriber {
    inner: Weak<ContextInner>,
}

#[async_trait]
impl SubscriptionAuth for ContextSubscriber {
    async fn subscribe(&self) -> Result<Subscription> {
        let inner = self.inner.upgrade().ok_or(Error::Closed)?;
        EditorContext { inner }.subscribe().await
    }
}

async fn run_pump(
    inner: Weak<ContextInner>,
    mut events: BoxStream<'static, Result<PushEvent>>,
    cancel: CancellationToken,
    status: watch::Sender<PumpStatus>,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("event pump cancelled");
                status.send_replace(PumpStatus::Cancelled);
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => match inner.upgrade() {
                Some(inner) => inner.route(event),
                None => {
                    status.send_replace(PumpStatus::Cancelled);
                    return;
                }
            },
            Some(Err(e)) => {
                tracing::error!(error = %e, "event pump stopped");
                status.send_replace(PumpStatus::Stopped(Arc::new(e)));
                return;
            }
            None => {
                status.send_replace(PumpStatus::Stopped(Arc::new(Error::Other(
                    "event stream ended".into(),
                ))));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EditorContext {
        let config = EditorConfig {
            base_url: "http://127.0.0.1:9/editor/".into(),
            credentials: Some("bob:hunter2".into()),
            ..EditorConfig::default()
        };
        EditorContext::new(config).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let ctx = ctx();
        assert_eq!(ctx.url("state/meta/st_1"), "http://127.0.0.1:9/editor/state/meta/st_1");
        assert_eq!(ctx.url("/auth/login"), "http://127.0.0.1:9/editor/auth/login");
    }

    #[test]
    fn bad_credentials_rejected_at_construction() {
        let config = EditorConfig {
            credentials: Some("bob:".into()),
            ..EditorConfig::default()
        };
        assert!(EditorContext::new(config).is_err());
    }

    #[tokio::test]
    async fn await_without_stream_is_an_error() {
        let err = ctx().await_state("st_1", None).await.unwrap_err();
        assert!(matches!(err, Error::StreamNotStarted));
    }

    #[tokio::test]
    async fn stop_without_start_is_an_error() {
        assert!(matches!(
            ctx().stream_stop().await,
            Err(Error::StreamNotStarted)
        ));
    }

    #[test]
    fn routing_updates_credits_and_registry() {
        let ctx = ctx();
        let fut = ctx.inner.registry.lock().get("st_1");
        ctx.inner.route(PushEvent {
            state: "st_1".into(),
            status: JobStatus::Ok,
            credits_left: Some(12),
            extra: Default::default(),
        });
        assert!(fut.is_resolved());
        assert_eq!(ctx.credits(), Some(12));
    }

    #[tokio::test]
    async fn login_without_credentials_fails_fast() {
        let ctx = EditorContext::new(EditorConfig::default()).unwrap();
        assert!(matches!(ctx.login().await, Err(Error::Auth(_))));
    }
}
