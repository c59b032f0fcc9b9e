//! Deadline middleware.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use super::Middleware;
use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::message::Message;

/// Races the inner handler against a deadline.
///
/// The inner call runs on a helper thread with a child context. When the
/// deadline fires first, the child context is cancelled and
/// `HandlerError::Timeout` is returned at once; the inner call may keep
/// running and its result is discarded.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Fail calls that run longer than `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Middleware for Timeout {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let duration = self.duration;
        Arc::new(move |ctx: &Context, msg: &Message| {
            let (tx, rx) = mpsc::sync_channel(1);
            let inner = Arc::clone(&next);
            let child = ctx.child();
            let inner_ctx = child.clone();
            let inner_msg = msg.clone();

            thread::Builder::new()
                .name("relaybus-timeout".into())
                .spawn(move || {
                    let _ = tx.send(inner(&inner_ctx, &inner_msg));
                })
                .map_err(HandlerError::other)?;

            match rx.recv_timeout(duration) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    child.cancel();
                    warn!(
                        id = %msg.id,
                        timeout_ms = duration.as_millis() as u64,
                        "handler timed out"
                    );
                    Err(HandlerError::Timeout(duration))
                }
                Err(RecvTimeoutError::Disconnected) => Err(HandlerError::Panicked(
                    "handler thread terminated without a result".into(),
                )),
            }
        })
    }
}
