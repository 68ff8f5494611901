//! Auto-reconnecting push-event stream.
//!
//! [`ResilientEventSource`] owns one SSE connection at a time. Every read
//! failure (connection loss, non-2xx open, missed heartbeat) drops the
//! connection and is recorded in a [`RetryContext`]; the next call sleeps
//! for the back-off plus the server-suggested retry delay and reconnects,
//! sending `Last-Event-ID` so the server can resume. Once the failure budget
//! is spent the source yields a terminal [`Error::StreamStopped`].
//!
//! The source is plain state driven by `&mut self` futures, so dropping a
//! pending call (task cancellation) never counts as a failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ea_domain::error::{Error, Result};
use ea_domain::stream::BoxStream;
use ea_domain::trace::TraceEvent;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, Response};
use tokio::sync::watch;

use crate::connection::from_reqwest;
use crate::retry::{BackoffPolicy, RetryContext};
use crate::sse::{SseDecoder, SseFrame};
use crate::types::PushEvent;

/// Where to connect, as handed out by the token exchange.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub url: String,
    /// Expected heartbeat period. `None` disables the read deadline.
    pub ping_interval: Option<Duration>,
}

/// Resolves a fresh subscription before every connection attempt.
#[async_trait]
pub trait SubscriptionAuth: Send + Sync {
    async fn subscribe(&self) -> Result<Subscription>;
}

struct Connection {
    response: Response,
    decoder: SseDecoder,
    read_deadline: Option<Duration>,
}

pub struct ResilientEventSource {
    auth: Arc<dyn SubscriptionAuth>,
    http: Client,
    retry: RetryContext<String>,
    heartbeat_grace: Duration,
    last_event_id: Option<String>,
    server_retry: Duration,
    active: watch::Sender<bool>,
    conn: Option<Connection>,
    pending: VecDeque<PushEvent>,
}

impl ResilientEventSource {
    pub fn new(
        auth: Arc<dyn SubscriptionAuth>,
        policy: BackoffPolicy,
        heartbeat_grace: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self> {
        // No total timeout: the body stays open for the life of the stream.
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(30));
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        let http = builder.build().map_err(|e| Error::Http(e.to_string()))?;
        let (active, _) = watch::channel(false);

        Ok(Self {
            auth,
            http,
            retry: RetryContext::new(policy),
            heartbeat_grace,
            last_event_id: None,
            server_retry: Duration::ZERO,
            active,
            conn: None,
            pending: VecDeque::new(),
        })
    }

    /// Forget the resume cursor and failure history and drop any open
    /// connection. The active signal goes back to `false`.
    pub fn reset(&mut self) {
        self.last_event_id = None;
        self.server_retry = Duration::ZERO;
        self.retry.reset();
        self.conn = None;
        self.pending.clear();
        self.active.send_replace(false);
    }

    /// `true` while a connection is open. Flips back to `false` on every
    /// failure so new waiters block until the next successful reconnect.
    pub fn active_signal(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn failures(&self) -> u32 {
        self.retry.failures()
    }

    /// Next decoded push event. Transient failures are retried internally;
    /// an `Err` is always terminal.
    pub async fn next_event(&mut self) -> Result<PushEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            if self.conn.is_none() {
                self.connect().await?;
            } else {
                self.read_once().await;
            }
        }
    }

    /// Drive the source as a stream that ends after its terminal error.
    pub fn into_stream(self) -> BoxStream<'static, Result<PushEvent>> {
        let stream = async_stream::stream! {
            let mut source = self;
            loop {
                match source.next_event().await {
                    Ok(event) => yield Ok(event),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    // ── state transitions ───────────────────────────────────────────

    async fn connect(&mut self) -> Result<()> {
        if self.retry.is_exhausted() {
            let err = Error::StreamStopped {
                failures: self.retry.failures(),
                first_error: self.retry.first_error().cloned().unwrap_or_default(),
                last_error: self.retry.last_error().cloned().unwrap_or_default(),
            };
            tracing::error!(error = %err, "event stream giving up");
            return Err(err);
        }

        let failures = self.retry.failures();
        if failures > 0 {
            let delay = self.retry.backoff() + self.server_retry;
            tracing::info!(
                attempt = failures + 1,
                delay_ms = delay.as_millis() as u64,
                "reconnecting event stream"
            );
            tokio::time::sleep(delay).await;
        }

        match self.open().await {
            Ok(conn) => {
                self.retry.success();
                self.conn = Some(conn);
                self.active.send_replace(true);
                tracing::info!(
                    attempt = failures + 1,
                    resumed_from = ?self.last_event_id,
                    "event stream connected"
                );
                TraceEvent::StreamConnected {
                    resumed_from: self.last_event_id.clone(),
                    attempt: failures + 1,
                }
                .emit();
            }
            Err(e) => self.record_failure(e),
        }
        Ok(())
    }

    async fn open(&self) -> Result<Connection> {
        let sub = self.auth.subscribe().await?;

        let mut rb = self
            .http
            .get(&sub.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = &self.last_event_id {
            rb = rb.header("Last-Event-ID", id);
        }

        let response = rb.send().await.map_err(from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let path = response.url().path().to_owned();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                method: "GET".into(),
                path,
                status: status.as_u16(),
                body,
            });
        }

        Ok(Connection {
            response,
            decoder: SseDecoder::new(),
            read_deadline: sub.ping_interval.map(|p| p + self.heartbeat_grace),
        })
    }

    async fn read_once(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        let outcome = match conn.read_deadline {
            Some(limit) => match tokio::time::timeout(limit, conn.response.chunk()).await {
                Ok(read) => read.map_err(from_reqwest),
                Err(_) => Err(Error::Timeout(format!(
                    "no heartbeat within {} ms",
                    limit.as_millis()
                ))),
            },
            None => conn.response.chunk().await.map_err(from_reqwest),
        };

        match outcome {
            Ok(Some(bytes)) => {
                conn.decoder.push(&bytes);
                let frames = conn.decoder.drain();
                let overflow = conn.decoder.overflowed().then(|| conn.decoder.buffered());
                for frame in frames {
                    self.handle_frame(frame);
                }
                if let Some(size) = overflow {
                    self.record_failure(Error::Protocol(format!(
                        "event stream sent {size} bytes without an event boundary"
                    )));
                }
            }
            Ok(None) => self.record_failure(Error::Http("event stream closed by server".into())),
            Err(e) => self.record_failure(e),
        }
    }

    fn handle_frame(&mut self, frame: SseFrame) {
        if let Some(id) = frame.id {
            self.last_event_id = if id.is_empty() { None } else { Some(id) };
        }
        if let Some(ms) = frame.retry {
            self.server_retry = Duration::from_millis(ms);
        }

        match frame.event.as_deref() {
            Some("ping") => tracing::trace!("event stream heartbeat"),
            None | Some("message") => {
                if frame.data.is_empty() {
                    return;
                }
                match PushEvent::decode(&frame.data) {
                    Some(event) => {
                        tracing::debug!(state_id = %event.state, status = ?event.status, "push event");
                        self.pending.push_back(event);
                    }
                    None => tracing::warn!(data = %frame.data, "skipping malformed push event"),
                }
            }
            Some(other) => tracing::debug!(event = other, "skipping unrecognized stream event"),
        }
    }

    fn record_failure(&mut self, err: Error) {
        self.conn = None;
        self.active.send_replace(false);
        self.retry.failure(err.to_string());

        let failures = self.retry.failures();
        let remaining = self.retry.remaining_attempts();
        tracing::warn!(failures, remaining, error = %err, "event stream failure");
        TraceEvent::StreamFailure {
            failures,
            remaining_attempts: remaining,
            error: err.to_string(),
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Refusing {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SubscriptionAuth for Refusing {
        async fn subscribe(&self) -> Result<Subscription> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(Error::Http(format!("refused #{n}")))
        }
    }

    struct Hanging;

    #[async_trait]
    impl SubscriptionAuth for Hanging {
        async fn subscribe(&self) -> Result<Subscription> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(Error::Other("unreachable".into()))
        }
    }

    fn fast_policy(max_failures: u32) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            exponent: 1.0,
            max_jitter: Duration::ZERO,
            max_backoff: Duration::from_millis(5),
            max_failures,
        }
    }

    fn source(auth: Arc<dyn SubscriptionAuth>, max_failures: u32) -> ResilientEventSource {
        ResilientEventSource::new(auth, fast_policy(max_failures), Duration::from_millis(100), None)
            .unwrap()
    }

    fn frame(event: Option<&str>, data: &str, id: Option<&str>) -> SseFrame {
        SseFrame {
            event: event.map(str::to_owned),
            data: data.to_owned(),
            id: id.map(str::to_owned),
            retry: None,
        }
    }

    #[tokio::test]
    async fn exhaustion_reports_first_and_last_error() {
        let auth = Arc::new(Refusing {
            calls: AtomicU32::new(0),
        });
        let mut src = source(auth.clone(), 3);

        // three failures are retried, the fourth is terminal
        let err = src.next_event().await.unwrap_err();
        match err {
            Error::StreamStopped {
                failures,
                first_error,
                last_error,
            } => {
                assert_eq!(failures, 4);
                assert!(first_error.contains("refused #1"));
                assert!(last_error.contains("refused #4"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(auth.calls.load(Ordering::SeqCst), 4);

        // Still terminal on the next call, without another attempt.
        assert!(src.next_event().await.is_err());
        assert_eq!(auth.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let mut src = source(Arc::new(Hanging), 3);
        let res = tokio::time::timeout(Duration::from_millis(20), src.next_event()).await;
        assert!(res.is_err());
        assert_eq!(src.failures(), 0);
        assert!(!*src.active_signal().borrow());
    }

    #[tokio::test]
    async fn reset_clears_cursor_and_failures() {
        let auth = Arc::new(Refusing {
            calls: AtomicU32::new(0),
        });
        let mut src = source(auth, 2);
        src.handle_frame(frame(None, r#"{"state":"st_1","status":"ok"}"#, Some("41")));
        let _ = src.next_event().await; // drains the pending event
        let _ = src.next_event().await; // exhausts
        assert_eq!(src.last_event_id(), Some("41"));
        assert_eq!(src.failures(), 3);

        src.reset();
        assert_eq!(src.last_event_id(), None);
        assert_eq!(src.failures(), 0);
    }

    #[test]
    fn frames_update_cursor_and_skip_noise() {
        let auth = Arc::new(Refusing {
            calls: AtomicU32::new(0),
        });
        let mut src = source(auth, 3);

        src.handle_frame(frame(Some("ping"), "", Some("1")));
        src.handle_frame(frame(None, "not json", Some("2")));
        src.handle_frame(frame(None, r#"{"status":"ok"}"#, Some("3")));
        src.handle_frame(frame(Some("telemetry"), r#"{"state":"x","status":"ok"}"#, Some("4")));
        assert!(src.pending.is_empty());
        assert_eq!(src.last_event_id(), Some("4"));

        src.handle_frame(frame(Some("message"), r#"{"state":"st_a","status":"ok"}"#, Some("5")));
        src.handle_frame(frame(None, r#"{"state":"st_b","status":"ko"}"#, None));
        let states: Vec<_> = src.pending.iter().map(|e| e.state.as_str()).collect();
        assert_eq!(states, ["st_a", "st_b"]);
        // frames without an id keep the previous cursor
        assert_eq!(src.last_event_id(), Some("5"));
    }

    #[test]
    fn retry_field_sets_server_delay() {
        let auth = Arc::new(Refusing {
            calls: AtomicU32::new(0),
        });
        let mut src = source(auth, 3);
        src.handle_frame(SseFrame {
            retry: Some(2500),
            ..SseFrame::default()
        });
        assert_eq!(src.server_retry, Duration::from_millis(2500));
    }
}
