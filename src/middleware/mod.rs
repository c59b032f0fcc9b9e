//! Middleware - composable handler decorators.
//!
//! A middleware turns one [`Handler`] into another. Chains compose in onion
//! order: the first middleware in a list is the outermost, so its
//! pre-processing runs first and its post-processing runs last.
//!
//! # Message Flow
//!
//! ```text
//! delivery ──► Recover ──► Logger ──► Retry ──► CircuitBreaker ──► handler
//!                 ▲                                                  │
//!                 └──────────────── result (ack / reject) ◄──────────┘
//! ```
//!
//! Middleware never settle a message on their own. Paths that skip the
//! inner handler (Filter, Deduplication) return `Ok` and let the adapter
//! acknowledge; protective paths (CircuitBreaker, RateLimit in drop mode,
//! Timeout) return an error and let the adapter reject.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relaybus::middleware::{compose, Logger, Recover, Retry, RetryPolicy, SharedMiddleware};
//! use relaybus::{handler_fn, Context, Message};
//!
//! let chain: Vec<SharedMiddleware> = vec![
//!     Arc::new(Recover::new()),
//!     Arc::new(Logger::new()),
//!     Arc::new(Retry::new(RetryPolicy::fixed(2, Duration::from_millis(1)))),
//! ];
//! let handler = compose(handler_fn(|_ctx, _msg| Ok(())), &chain);
//! handler(&Context::new(), &Message::new(Vec::new())).unwrap();
//! ```

mod circuit_breaker;
mod dedup;
mod filter;
mod logger;
mod priority;
mod rate_limit;
mod recover;
mod retry;
mod timeout;
mod token_bucket;

use std::sync::Arc;

use crate::handler::Handler;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use dedup::{DedupMode, DedupStore, DedupSweeper, Deduplication, InMemoryDedupStore};
pub use filter::Filter;
pub use logger::Logger;
pub use priority::Priority;
pub use rate_limit::{RateLimit, RateLimitMode};
pub use recover::Recover;
pub use retry::{Backoff, Retry, RetryPolicy};
pub use timeout::Timeout;
pub use token_bucket::TokenBucket;

/// A handler decorator.
pub trait Middleware: Send + Sync {
    /// Middleware name for identification and logging
    fn name(&self) -> &'static str;

    /// Wrap `next`, returning the decorated handler.
    fn wrap(&self, next: Handler) -> Handler;
}

/// Middleware shared between registrations.
pub type SharedMiddleware = Arc<dyn Middleware>;

/// Apply `middleware` around `handler`; the first element is outermost.
pub fn compose(handler: Handler, middleware: &[SharedMiddleware]) -> Handler {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, mw| mw.wrap(next))
}

/// Closure-backed middleware.
///
/// ```
/// use std::sync::Arc;
/// use relaybus::middleware::{from_fn, Middleware};
/// use relaybus::{Context, Handler, Message};
///
/// let tag = from_fn("tag", |next: Handler| -> Handler {
///     Arc::new(move |ctx: &Context, msg: &Message| next(ctx, msg))
/// });
/// assert_eq!(tag.name(), "tag");
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    wrap: F,
}

/// Build a middleware from a `Handler -> Handler` closure.
pub fn from_fn<F>(name: &'static str, wrap: F) -> FnMiddleware<F>
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    FnMiddleware { name, wrap }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn wrap(&self, next: Handler) -> Handler {
        (self.wrap)(next)
    }
}
