//! Consecutive-failure bookkeeping with jittered exponential back-off.

use std::time::Duration;

use ea_domain::config::StreamConfig;

/// Shape of the back-off curve and the failure budget.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay unit multiplied by `exponent^failures`.
    pub base: Duration,
    pub exponent: f64,
    /// Upper bound of the uniform random jitter added to every delay.
    pub max_jitter: Duration,
    /// Hard cap, jitter included.
    pub max_backoff: Duration,
    /// Consecutive failures that are still retried; one more is terminal.
    pub max_failures: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for BackoffPolicy {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            base: cfg.backoff_base(),
            exponent: cfg.backoff_exponent,
            max_jitter: cfg.max_jitter(),
            max_backoff: cfg.max_backoff(),
            max_failures: cfg.max_failures,
        }
    }
}

/// Tracks consecutive failures of one retried operation.
///
/// Pure state: it never sleeps, the owner decides what to do with
/// [`backoff`](Self::backoff) and [`remaining_attempts`](Self::remaining_attempts).
#[derive(Debug)]
pub struct RetryContext<E> {
    policy: BackoffPolicy,
    failures: u32,
    first_error: Option<E>,
    last_error: Option<E>,
}

impl<E> RetryContext<E> {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            first_error: None,
            last_error: None,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Record one failure. The first failure since the last success is
    /// kept as `first_error`; every failure replaces `last_error`.
    pub fn failure(&mut self, err: E)
    where
        E: Clone,
    {
        if self.failures == 0 {
            self.first_error = Some(err.clone());
        }
        self.failures = self.failures.saturating_add(1);
        self.last_error = Some(err);
    }

    pub fn success(&mut self) {
        self.reset();
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.first_error = None;
        self.last_error = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn first_error(&self) -> Option<&E> {
        self.first_error.as_ref()
    }

    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Attempts left before the budget is spent: `max_failures + 1 - failures`,
    /// saturating at zero. Zero is terminal, so the operation is given up
    /// only once `failures > max_failures`.
    pub fn remaining_attempts(&self) -> u32 {
        self.policy
            .max_failures
            .saturating_add(1)
            .saturating_sub(self.failures)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_attempts() == 0
    }

    /// `min(base * exponent^failures + uniform(0, max_jitter), max_backoff)`,
    /// or zero when nothing has failed. Jitter is re-sampled on every call.
    pub fn backoff(&self) -> Duration {
        if self.failures == 0 {
            return Duration::ZERO;
        }
        let exp = self.failures.min(i32::MAX as u32) as i32;
        let base_ms = self.policy.base.as_millis() as f64;
        let jitter_ms = self.policy.max_jitter.as_millis() as f64 * rand::random::<f64>();
        let max_ms = self.policy.max_backoff.as_millis() as f64;

        // inf and NaN both collapse to the cap through `min`.
        let delay_ms = (base_ms * self.policy.exponent.powi(exp) + jitter_ms).min(max_ms);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}
