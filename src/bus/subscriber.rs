//! Subscriber port.

use super::BusError;
use crate::context::Context;
use crate::handler::Handler;
use crate::message::Message;

/// Per-subscription tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Maximum concurrent deliveries for this subscription. `None` uses the
    /// adapter default.
    pub concurrency: Option<usize>,
}

impl SubscribeOptions {
    /// Options with an explicit concurrency.
    pub fn concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: Some(concurrency),
        }
    }
}

/// Trait for consuming messages from a broker (push-based).
///
/// Subscribers in the same group compete for messages; distinct groups on
/// one topic each receive every message. Delivery is at-least-once.
pub trait Subscriber: Send + Sync {
    /// Register a continuously running consumer for `(topic, group)`.
    ///
    /// Returns once the broker has confirmed the registration.
    fn subscribe(&self, topic: &str, group: &str, handler: Handler) -> Result<(), BusError>;

    /// Like [`Subscriber::subscribe`] with explicit options.
    ///
    /// Default implementation ignores the options.
    fn subscribe_with(
        &self,
        topic: &str,
        group: &str,
        options: SubscribeOptions,
        handler: Handler,
    ) -> Result<(), BusError> {
        let _ = options;
        self.subscribe(topic, group, handler)
    }

    /// Halt intake of new deliveries without closing the transport.
    /// Calling it more than once is a no-op.
    fn stop(&self);

    /// Stop and release the transport.
    fn close(&self) -> Result<(), BusError>;
}

/// Run `handler` for one delivery and settle the message from its result.
///
/// Adapters call this so a handler that already acknowledged or rejected
/// the message is never settled twice.
pub fn deliver(ctx: &Context, handler: &Handler, message: &Message) {
    let result = handler(ctx, message);
    if message.is_settled() {
        return;
    }
    match result {
        Ok(()) => {
            message.acknowledge();
        }
        Err(err) => {
            tracing::debug!(
                id = %message.id,
                topic = message.topic().unwrap_or_default(),
                error = %err,
                "handler failed, rejecting message"
            );
            message.reject();
        }
    }
}
