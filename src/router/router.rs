use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::RouterError;
use crate::bus::{SubscribeOptions, Subscriber};
use crate::context::Context;
use crate::events::{Dispatcher, EventRegistry};
use crate::handler::Handler;
use crate::middleware::{compose, Retry, SharedMiddleware};

/// How often `run` re-checks the caller's context while waiting.
const WAIT_POLL: Duration = Duration::from_millis(50);

struct Registration {
    handler: Handler,
    middleware: Vec<SharedMiddleware>,
    options: SubscribeOptions,
}

/// Holds (topic, group) registrations and drives their subscriptions.
///
/// Registrations are keyed by (topic, group); registering the same key again
/// replaces the earlier registration. Global middleware wrap every
/// registration outside its own middleware.
///
/// ```
/// use std::sync::Arc;
/// use relaybus::bus::InMemoryBus;
/// use relaybus::middleware::{Logger, Recover};
/// use relaybus::router::Router;
/// use relaybus::{handler_fn, Context};
///
/// let bus = InMemoryBus::new();
/// let mut router = Router::new(Arc::new(bus.clone()));
/// router
///     .add_middleware(Arc::new(Recover::new()))
///     .add_handler_with_middleware(
///         "q.lifecycle",
///         "worker",
///         handler_fn(|_ctx, _msg| Ok(())),
///         vec![Arc::new(Logger::new())],
///     );
///
/// let ctx = Context::new();
/// ctx.cancel();
/// router.run(&ctx).unwrap();
/// ```
pub struct Router {
    subscriber: Arc<dyn Subscriber>,
    registrations: BTreeMap<(String, String), Registration>,
    global: Vec<SharedMiddleware>,
    running: AtomicBool,
    stop_signal: Context,
}

impl Router {
    pub fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            registrations: BTreeMap::new(),
            global: Vec::new(),
            running: AtomicBool::new(false),
            stop_signal: Context::new(),
        }
    }

    /// Register a handler without its own middleware.
    pub fn add_handler(
        &mut self,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Handler,
    ) -> &mut Self {
        self.add_handler_with_options(topic, group, handler, Vec::new(), SubscribeOptions::default())
    }

    /// Register a handler wrapped by `middleware` (first element outermost).
    pub fn add_handler_with_middleware(
        &mut self,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Handler,
        middleware: Vec<SharedMiddleware>,
    ) -> &mut Self {
        self.add_handler_with_options(topic, group, handler, middleware, SubscribeOptions::default())
    }

    /// Register a handler with middleware and subscribe options.
    pub fn add_handler_with_options(
        &mut self,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Handler,
        middleware: Vec<SharedMiddleware>,
        options: SubscribeOptions,
    ) -> &mut Self {
        let key = (topic.into(), group.into());
        if self.registrations.contains_key(&key) {
            debug!(topic = %key.0, group = %key.1, "replacing handler registration");
        }
        self.registrations.insert(
            key,
            Registration {
                handler,
                middleware,
                options,
            },
        );
        self
    }

    /// Append a middleware applied to every registration.
    pub fn add_middleware(&mut self, middleware: SharedMiddleware) -> &mut Self {
        self.global.push(middleware);
        self
    }

    /// Register `dispatcher` on every topic configured in `registry`.
    ///
    /// Each topic subscribes by physical name with its consumer group (the
    /// topic key when no group is configured) and concurrency. Topics with a
    /// retry policy get a [`Retry`] middleware.
    pub fn add_dispatcher(&mut self, registry: &EventRegistry, dispatcher: &Dispatcher) -> &mut Self {
        for (key, topic) in registry.topics() {
            let group = if topic.group.is_empty() {
                key.clone()
            } else {
                topic.group.clone()
            };
            let middleware: Vec<SharedMiddleware> = topic
                .retry
                .clone()
                .map(|policy| Arc::new(Retry::new(policy)) as SharedMiddleware)
                .into_iter()
                .collect();

            debug!(topic_key = %key, topic = %topic.name, group = %group, "binding dispatcher");
            self.add_handler_with_options(
                topic.name,
                group,
                dispatcher.handler(),
                middleware,
                SubscribeOptions::concurrency(topic.concurrency),
            );
        }
        self
    }

    /// Registered (topic, group) keys in subscription order.
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.registrations.keys().cloned().collect()
    }

    /// Subscribe every registration and serve until `ctx` is cancelled or
    /// [`Router::stop`] is called.
    ///
    /// Subscriptions happen in (topic, group) order. If one fails, the
    /// subscriber is stopped and the error returned. When `run` returns the
    /// subscriber has been stopped; in-flight handlers are not aborted.
    pub fn run(&self, ctx: &Context) -> Result<(), RouterError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(RouterError::AlreadyRunning);
        }
        if self.stop_signal.is_cancelled() {
            return Ok(());
        }

        for ((topic, group), registration) in &self.registrations {
            let handler = compose(
                compose(Arc::clone(&registration.handler), &registration.middleware),
                &self.global,
            );
            if let Err(source) =
                self.subscriber
                    .subscribe_with(topic, group, registration.options, handler)
            {
                error!(topic = %topic, group = %group, error = %source, "subscription failed, stopping router");
                self.subscriber.stop();
                return Err(RouterError::Subscribe {
                    topic: topic.clone(),
                    group: group.clone(),
                    source,
                });
            }
            debug!(topic = %topic, group = %group, "registration subscribed");
        }

        info!(registrations = self.registrations.len(), "router running");
        while !ctx.is_cancelled() && !self.stop_signal.wait_timeout(WAIT_POLL) {}

        self.subscriber.stop();
        info!("router stopped");
        Ok(())
    }

    /// Ask a running router to stop. Calling it more than once is a no-op.
    pub fn stop(&self) {
        self.stop_signal.cancel();
    }

    /// Whether `run` has been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.stop_signal.is_cancelled()
    }
}
