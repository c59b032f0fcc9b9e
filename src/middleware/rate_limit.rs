//! Rate limiting middleware.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{Middleware, TokenBucket};
use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::message::Message;

/// What to do when no token is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitMode {
    /// Wait for a token (cancellable through the context).
    Block,
    /// Fail with `HandlerError::RateLimited`.
    Drop,
}

/// Consults a shared [`TokenBucket`] before every inner call.
#[derive(Debug, Clone)]
pub struct RateLimit {
    bucket: Arc<TokenBucket>,
    mode: RateLimitMode,
}

impl RateLimit {
    /// Take one token from `bucket` per call, waiting or dropping per `mode`.
    pub fn new(bucket: Arc<TokenBucket>, mode: RateLimitMode) -> Self {
        Self { bucket, mode }
    }

    /// Blocking limiter.
    pub fn blocking(bucket: Arc<TokenBucket>) -> Self {
        Self::new(bucket, RateLimitMode::Block)
    }

    /// Dropping limiter.
    pub fn dropping(bucket: Arc<TokenBucket>) -> Self {
        Self::new(bucket, RateLimitMode::Drop)
    }

    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }
}

fn acquire(bucket: &TokenBucket, mode: RateLimitMode, ctx: &Context) -> Result<(), HandlerError> {
    loop {
        if bucket.try_acquire() {
            return Ok(());
        }
        if mode == RateLimitMode::Drop {
            return Err(HandlerError::RateLimited);
        }
        let wait = bucket.time_until_available().max(Duration::from_millis(1));
        if ctx.wait_timeout(wait) {
            return Err(HandlerError::Cancelled);
        }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let bucket = Arc::clone(&self.bucket);
        let mode = self.mode;
        Arc::new(move |ctx: &Context, msg: &Message| {
            if let Err(err) = acquire(&bucket, mode, ctx) {
                debug!(id = %msg.id, error = %err, "rate limit refused message");
                return Err(err);
            }
            next(ctx, msg)
        })
    }
}
