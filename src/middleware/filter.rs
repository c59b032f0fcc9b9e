//! Predicate filter middleware.

use std::sync::Arc;

use tracing::debug;

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;
use crate::message::Message;

type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Skips the inner handler when the predicate returns false.
///
/// Skipped messages return `Ok(())` and are acknowledged by the adapter.
#[derive(Clone)]
pub struct Filter {
    predicate: Predicate,
}

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Pass only messages whose metadata `key` equals `value`.
    pub fn metadata_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        Self::new(move |msg: &Message| msg.meta(&key) == Some(value.as_str()))
    }
}

impl Middleware for Filter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let predicate = Arc::clone(&self.predicate);
        Arc::new(move |ctx: &Context, msg: &Message| {
            if !predicate(msg) {
                debug!(id = %msg.id, "message filtered out");
                return Ok(());
            }
            next(ctx, msg)
        })
    }
}
