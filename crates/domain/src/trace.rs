use serde::Serialize;

/// Structured trace events emitted across all editor-api crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ApiCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    StreamConnected {
        resumed_from: Option<String>,
        attempt: u32,
    },
    StreamFailure {
        failures: u32,
        remaining_attempts: u32,
        error: String,
    },
    StateResolved {
        state_id: String,
        ok: bool,
        via: ResolvedVia,
    },
    CreditsUpdated {
        credits: i64,
    },
}

/// Which path settled a state wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedVia {
    Stream,
    Poll,
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ea_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let ev = TraceEvent::StateResolved {
            state_id: "st_123".into(),
            ok: true,
            via: ResolvedVia::Poll,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "StateResolved");
        assert_eq!(json["via"], "poll");
        assert_eq!(json["state_id"], "st_123");
    }
}
