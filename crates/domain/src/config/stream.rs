use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Push stream reconnect policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Consecutive failures still retried; the next one stops the stream.
    #[serde(default = "d_5")]
    pub max_failures: u32,
    #[serde(default = "d_500")]
    pub backoff_base_ms: u64,
    #[serde(default = "d_2f")]
    pub backoff_exponent: f64,
    /// Upper bound of the uniform jitter added to every back-off.
    #[serde(default = "d_1000")]
    pub max_jitter_ms: u64,
    #[serde(default = "d_30000")]
    pub max_backoff_ms: u64,
    /// Slack added to the server's ping interval before a read is
    /// considered stalled.
    #[serde(default = "d_5000")]
    pub heartbeat_grace_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            backoff_base_ms: 500,
            backoff_exponent: 2.0,
            max_jitter_ms: 1000,
            max_backoff_ms: 30_000,
            heartbeat_grace_ms: 5000,
        }
    }
}

impl StreamConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn heartbeat_grace(&self) -> Duration {
        Duration::from_millis(self.heartbeat_grace_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_5() -> u32 {
    5
}
fn d_500() -> u64 {
    500
}
fn d_2f() -> f64 {
    2.0
}
fn d_1000() -> u64 {
    1000
}
fn d_30000() -> u64 {
    30_000
}
fn d_5000() -> u64 {
    5000
}
