use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::StreamConfig;
use crate::error::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Editor API connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// `"user:password"` or an API key.
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Default bound on a single state wait.
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
    /// Bound on each plain HTTP request (not the push stream).
    #[serde(default = "d_30000")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub subscription_topic: Option<String>,
    #[serde(default = "d_256")]
    pub futures_capacity: usize,
    /// How many 404s the fallback poll tolerates before calling a state unknown.
    #[serde(default = "d_3")]
    pub unknown_state_retries: u32,
    #[serde(default = "d_1000")]
    pub unknown_state_retry_ms: u64,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            credentials: None,
            priority: Priority::Standard,
            timeout_ms: 60_000,
            request_timeout_ms: 30_000,
            user_agent: None,
            subscription_topic: None,
            futures_capacity: 256,
            unknown_state_retries: 3,
            unknown_state_retry_ms: 1000,
            stream: StreamConfig::default(),
        }
    }
}

impl EditorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Overlay `EDITOR_API_URL`, `EDITOR_API_CREDENTIALS` and
    /// `EDITOR_API_PRIORITY` from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("EDITOR_API_URL") {
            if !url.is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(creds) = std::env::var("EDITOR_API_CREDENTIALS") {
            if !creds.is_empty() {
                self.credentials = Some(creds);
            }
        }
        if let Ok(raw) = std::env::var("EDITOR_API_PRIORITY") {
            match raw.parse() {
                Ok(p) => self.priority = p,
                Err(e) => tracing::warn!(error = %e, "ignoring EDITOR_API_PRIORITY"),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Priority
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Server-side scheduling hint forwarded with every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Standard,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Standard => "standard",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "standard" => Ok(Priority::Standard),
            "high" => Ok(Priority::High),
            other => Err(Error::Config(format!("unknown priority: {other}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    UserPassword { user: String, password: String },
    ApiKey(String),
}

impl Credentials {
    /// `user@example.com:P455w0rD` splits at the first `:`; anything
    /// without a colon is an API key.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Config("credentials must not be empty".into()));
        }
        match raw.split_once(':') {
            Some((user, password)) if !user.is_empty() && !password.is_empty() => {
                Ok(Credentials::UserPassword {
                    user: user.to_owned(),
                    password: password.to_owned(),
                })
            }
            Some(_) => Err(Error::Config(
                "credentials must be user:password or an API key".into(),
            )),
            None => Ok(Credentials::ApiKey(raw.to_owned())),
        }
    }
}

// Never print secrets.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UserPassword { user, .. } => f
                .debug_struct("UserPassword")
                .field("user", user)
                .field("password", &"***")
                .finish(),
            Credentials::ApiKey(_) => f.debug_tuple("ApiKey").field(&"***").finish(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.finegrain.ai/editor".into()
}
fn d_60000() -> u64 {
    60_000
}
fn d_30000() -> u64 {
    30_000
}
fn d_256() -> usize {
    256
}
fn d_3() -> u32 {
    3
}
fn d_1000() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_password() {
        let c = Credentials::parse("user@example.com:P455w0rD").unwrap();
        assert_eq!(
            c,
            Credentials::UserPassword {
                user: "user@example.com".into(),
                password: "P455w0rD".into(),
            }
        );
    }

    #[test]
    fn password_may_contain_colons() {
        let c = Credentials::parse("bob:a:b:c").unwrap();
        assert_eq!(
            c,
            Credentials::UserPassword {
                user: "bob".into(),
                password: "a:b:c".into(),
            }
        );
    }

    #[test]
    fn parse_api_key() {
        let c = Credentials::parse("FGAPI-123456").unwrap();
        assert_eq!(c, Credentials::ApiKey("FGAPI-123456".into()));
    }

    #[test]
    fn empty_halves_rejected() {
        assert!(Credentials::parse("").is_err());
        assert!(Credentials::parse(":secret").is_err());
        assert!(Credentials::parse("bob:").is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let c = Credentials::parse("bob:hunter2").unwrap();
        assert!(!format!("{c:?}").contains("hunter2"));
        let k = Credentials::parse("FGAPI-secret").unwrap();
        assert!(!format!("{k:?}").contains("secret"));
    }

    #[test]
    fn priority_round_trips_strings() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(Priority::Low.to_string(), "low");
        assert!("urgent".parse::<Priority>().is_err());
    }
}
