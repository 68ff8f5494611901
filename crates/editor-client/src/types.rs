//! Wire types for the editor API.

use serde::{Deserialize, Serialize};

/// Opaque server-assigned identifier of an uploaded asset or skill output.
pub type StateId = String;

/// `(left, top, right, bottom)` in pixels.
pub type BBox = (i64, i64, i64, i64);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Push events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Final status of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Ko,
}

impl JobStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, JobStatus::Ok)
    }

    pub(crate) fn from_meta(meta: &serde_json::Value) -> Option<Self> {
        match meta.get("status").and_then(serde_json::Value::as_str) {
            Some("ok") => Some(JobStatus::Ok),
            Some("ko") => Some(JobStatus::Ko),
            _ => None,
        }
    }
}

/// A decoded push notification: state `state` finished with `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub state: StateId,
    pub status: JobStatus,
    /// Remaining account credits, when the server includes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_left: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PushEvent {
    /// Decode an SSE data payload. Returns `None` for anything that is not
    /// a JSON object with a string `state` and a known `status`.
    pub fn decode(data: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        if !value.get("state").is_some_and(serde_json::Value::is_string) {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth / subscription responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST auth/login: response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

/// GET auth/me: response body; also nested in [`LoginResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub credits: Option<i64>,
}

/// POST sub-auth: response body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubAuthResponse {
    pub token: String,
    /// Expected heartbeat period, in seconds.
    #[serde(default)]
    pub ping_interval: Option<f64>,
}

/// POST skills/{name}, state/create, state/upload: response body.
#[derive(Debug, Clone, Deserialize)]
pub struct StateAccepted {
    pub state: StateId,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Images
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Auto,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Webp => "WEBP",
            ImageFormat::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageResolution {
    #[default]
    Full,
    Display,
}

impl ImageResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageResolution::Full => "FULL",
            ImageResolution::Display => "DISPLAY",
        }
    }
}

/// How to fetch the image produced by a skill, when the caller wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageOutParams {
    pub format: ImageFormat,
    pub resolution: ImageResolution,
}

impl ImageOutParams {
    pub fn new(format: ImageFormat, resolution: ImageResolution) -> Self {
        Self { format, resolution }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skill outcomes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A job that finished with `status: "ko"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResult {
    pub state_id: StateId,
    pub error: String,
}

impl ErrorResult {
    pub(crate) fn from_meta(state_id: StateId, meta: &serde_json::Value) -> Self {
        let error = meta
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| "unknown error".to_owned());
        Self { state_id, error }
    }
}

/// Result of a typed skill call, decided once from the `status` field.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillOutcome<T> {
    Ok(T),
    Failed(ErrorResult),
}

impl<T> SkillOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, SkillOutcome::Ok(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SkillOutcome<U> {
        match self {
            SkillOutcome::Ok(v) => SkillOutcome::Ok(f(v)),
            SkillOutcome::Failed(e) => SkillOutcome::Failed(e),
        }
    }

    /// Turn a job failure into [`Error::JobFailed`](ea_domain::error::Error::JobFailed).
    pub fn into_result(self) -> ea_domain::error::Result<T> {
        match self {
            SkillOutcome::Ok(v) => Ok(v),
            SkillOutcome::Failed(e) => Err(ea_domain::error::Error::JobFailed {
                state_id: e.state_id,
                message: e.error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_push_event_with_credits() {
        let ev = PushEvent::decode(r#"{"state":"st_1","status":"ok","credits_left":41}"#).unwrap();
        assert_eq!(ev.state, "st_1");
        assert_eq!(ev.status, JobStatus::Ok);
        assert_eq!(ev.credits_left, Some(41));
    }

    #[test]
    fn decode_keeps_auxiliary_fields() {
        let ev = PushEvent::decode(r#"{"state":"st_2","status":"ko","skill":"erase"}"#).unwrap();
        assert_eq!(ev.status, JobStatus::Ko);
        assert_eq!(ev.extra["skill"], "erase");
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(PushEvent::decode("").is_none());
        assert!(PushEvent::decode("not json").is_none());
        assert!(PushEvent::decode("[1,2]").is_none());
        assert!(PushEvent::decode(r#"{"status":"ok"}"#).is_none());
        assert!(PushEvent::decode(r#"{"state":5,"status":"ok"}"#).is_none());
        assert!(PushEvent::decode(r#"{"state":"st","status":"pending"}"#).is_none());
    }

    #[test]
    fn error_result_reads_meta_error() {
        let meta = serde_json::json!({"status": "ko", "error": "could not infer bbox (not found)"});
        let e = ErrorResult::from_meta("st_9".into(), &meta);
        assert_eq!(e.error, "could not infer bbox (not found)");

        let e = ErrorResult::from_meta("st_9".into(), &serde_json::json!({"status": "ko"}));
        assert_eq!(e.error, "unknown error");
    }

    #[test]
    fn outcome_into_result_maps_failure() {
        let failed: SkillOutcome<()> = SkillOutcome::Failed(ErrorResult {
            state_id: "st_3".into(),
            error: "boom".into(),
        });
        let err = failed.into_result().unwrap_err();
        assert!(err.is_job_failure());
    }

    #[test]
    fn job_status_from_meta() {
        assert_eq!(JobStatus::from_meta(&serde_json::json!({"status": "ok"})), Some(JobStatus::Ok));
        assert_eq!(JobStatus::from_meta(&serde_json::json!({"status": "ko"})), Some(JobStatus::Ko));
        assert_eq!(JobStatus::from_meta(&serde_json::json!({"status": "pending"})), None);
        assert_eq!(JobStatus::from_meta(&serde_json::json!({})), None);
    }
}
