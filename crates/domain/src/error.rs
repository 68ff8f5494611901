use std::sync::Arc;

/// Shared error type used across all editor-api crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-2xx response from the editor API.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("auth: {0}")]
    Auth(String),

    #[error("config: {0}")]
    Config(String),

    /// The editor API answered with something we cannot interpret.
    #[error("protocol: {0}")]
    Protocol(String),

    #[error("event stream not started")]
    StreamNotStarted,

    #[error("event stream already running")]
    StreamAlreadyRunning,

    /// The push stream gave up after exhausting its reconnect budget.
    #[error("event stream stopped after {failures} consecutive failures (first: {first_error}; last: {last_error})")]
    StreamStopped {
        failures: u32,
        first_error: String,
        last_error: String,
    },

    /// The push stream was stopped by the caller.
    #[error("event stream cancelled")]
    StreamCancelled,

    /// A caller was waiting on a state when the push stream died.
    #[error("event stream stopped while waiting for state {state_id}")]
    StreamDied {
        state_id: String,
        #[source]
        cause: Arc<Error>,
    },

    #[error("unknown state: {0}")]
    UnknownState(String),

    #[error("state {state_id} timed out after {timeout_ms} ms")]
    StateTimeout { state_id: String, timeout_ms: u64 },

    /// The remote job finished with `status: "ko"`.
    #[error("job {state_id} failed: {message}")]
    JobFailed { state_id: String, message: String },

    #[error("session closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Business-logic failure reported by the editor API, as opposed to an
    /// infrastructure failure.
    pub fn is_job_failure(&self) -> bool {
        matches!(self, Error::JobFailed { .. })
    }

    /// Infrastructure failures a bridge should surface as 5xx and may retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StreamStopped { .. }
            | Error::StreamDied { .. }
            | Error::Timeout(_)
            | Error::StateTimeout { .. }
            | Error::Http(_) => true,
            Error::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
