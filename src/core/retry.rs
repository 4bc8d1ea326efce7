// src/core/retry.rs

//! The retry/backoff policy applied to failed connection attempts.
//!
//! The policy is a pure function of its inputs: the caller supplies the
//! attempt number, the last error and the total time spent retrying.

use crate::core::ClientError;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for a single backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(3000);
/// Once this much time has been spent retrying, the policy gives up.
pub const MAX_TOTAL_RETRY_TIME: Duration = Duration::from_secs(60 * 60);

/// Inputs to a retry decision.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// 1-based count of failed connection attempts so far.
    pub attempt: u32,
    pub error: &'a ClientError,
    /// Time elapsed since the first failure of this connection cycle.
    pub total_retry_time: Duration,
}

/// What the connection machinery should do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Abort(ClientError),
}

/// The callback handed to a capability factory.
pub type RetryStrategy = Arc<dyn Fn(&RetryContext<'_>) -> RetryDecision + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Decides whether to retry a failed connection attempt.
    ///
    /// Aborts once the total retry time exceeds one hour or the attempt count
    /// exceeds `max_attempts`; otherwise retries after
    /// `min(attempt * base_delay, 3000ms)`.
    pub fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision {
        if ctx.total_retry_time > MAX_TOTAL_RETRY_TIME {
            return RetryDecision::Abort(ClientError::RetryTimeExhausted {
                elapsed: ctx.total_retry_time,
            });
        }
        if ctx.attempt > self.max_attempts {
            return RetryDecision::Abort(ClientError::RetryAttemptsExhausted {
                attempts: ctx.attempt,
                last_error: ctx.error.to_string(),
            });
        }
        let delay = self.base_delay.saturating_mul(ctx.attempt);
        RetryDecision::RetryAfter(delay.min(MAX_RETRY_DELAY))
    }
}
