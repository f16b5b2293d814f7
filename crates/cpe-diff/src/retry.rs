//! Retry policy for busy backends

use reqwest::StatusCode;
use std::time::Duration;

/// Exponential backoff retry policy applied to server-busy responses.
///
/// Only statuses in `retry_statuses` are retried. Transport errors are
/// never retried here; the caller classifies them instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first request
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time after
    pub initial_backoff: Duration,
    /// Statuses that trigger another attempt
    pub retry_statuses: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            retry_statuses: vec![StatusCode::SERVICE_UNAVAILABLE, StatusCode::GATEWAY_TIMEOUT],
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Whether a response with this status should be retried
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed
    pub fn should_retry(&self, attempt: u32, status: StatusCode) -> bool {
        attempt < self.max_attempts && self.is_retryable(status)
    }

    /// Delay to wait after the given 1-based attempt failed.
    ///
    /// Gives `initial, 2*initial, 4*initial, ...`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}
