//! Retry middleware with fixed or exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;
use crate::message::Message;

/// Delay growth between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay multiplied by `multiplier` after each retry.
    Exponential,
}

/// Configuration for retry behavior.
///
/// Also the `retry` table of a topic in the event schema:
///
/// ```toml
/// retry = { max_attempts = 3, delay_ms = 100, backoff = "exponential" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first call (0 = call once, never retry)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub delay_ms: u64,
    pub backoff: Backoff,
    /// Growth factor for exponential backoff
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 100,
            backoff: Backoff::Fixed,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between retries.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Exponential backoff starting at `initial_delay`.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: initial_delay.as_millis() as u64,
            backoff: Backoff::Exponential,
            max_delay_ms: max_delay.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = self.delay_ms as f64;
        let delay_ms = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => base * self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32),
        };
        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Retries a failing handler according to a [`RetryPolicy`].
///
/// Total calls never exceed `max_attempts + 1`. After the last attempt the
/// last error is returned, which makes the adapter reject the message.
/// Errors that are not [retryable](crate::HandlerError::is_retryable), and
/// calls that already settled the message, are returned immediately.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
}

impl Retry {
    /// Retry failing calls as `policy` prescribes.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Middleware for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let policy = self.policy.clone();
        Arc::new(move |ctx: &Context, msg: &Message| {
            let mut retries = 0;
            loop {
                let err = match next(ctx, msg) {
                    Ok(()) => return Ok(()),
                    Err(err) => err,
                };
                if retries >= policy.max_attempts || !err.is_retryable() || msg.is_settled() {
                    return Err(err);
                }

                retries += 1;
                let delay = policy.delay_for_retry(retries);
                debug!(
                    id = %msg.id,
                    retry = retries,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying handler"
                );
                if ctx.wait_timeout(delay) {
                    return Err(err);
                }
            }
        })
    }
}
