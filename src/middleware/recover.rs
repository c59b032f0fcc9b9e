//! Panic containment middleware.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::Middleware;
use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::message::Message;

/// Converts a panic in the inner handler into `HandlerError::Panicked`.
///
/// Place it outermost in production chains so no handler fault can take
/// down a delivery loop. With [`Recover::repanic`] the panic is logged and
/// then resumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover {
    repanic: bool,
}

impl Recover {
    /// Contain and log panics.
    pub fn new() -> Self {
        Self { repanic: false }
    }

    /// Log panics, then resume unwinding.
    pub fn repanic() -> Self {
        Self { repanic: true }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Middleware for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let repanic = self.repanic;
        Arc::new(move |ctx: &Context, msg: &Message| {
            match panic::catch_unwind(AssertUnwindSafe(|| next(ctx, msg))) {
                Ok(result) => result,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(id = %msg.id, panic = %reason, "handler panicked");
                    if repanic {
                        panic::resume_unwind(payload);
                    }
                    Err(HandlerError::Panicked(reason))
                }
            }
        })
    }
}
