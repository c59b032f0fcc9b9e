//! Logging middleware.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;
use crate::message::Message;

/// Records start, outcome and duration of every handler call.
///
/// Never changes the handler's result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Logger {
    /// Log at debug level on start and success, warn on failure.
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |ctx: &Context, msg: &Message| {
            let start = Instant::now();
            let topic = msg.topic().unwrap_or_default();
            let event_type = msg.event_type().unwrap_or_default();
            debug!(
                id = %msg.id,
                topic,
                event_type,
                attempts = msg.attempts(),
                "handling message"
            );

            let result = next(ctx, msg);
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => debug!(id = %msg.id, topic, event_type, elapsed_ms, "message handled"),
                Err(err) => warn!(
                    id = %msg.id,
                    topic,
                    event_type,
                    elapsed_ms,
                    error = %err,
                    "message handler failed"
                ),
            }
            result
        })
    }
}
