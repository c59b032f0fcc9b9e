//! Event-type dispatch to named handler functions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::DispatchError;
use super::registry::EventRegistry;
use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::message::{peek_event_type, Message};

/// A business handler: receives the raw payload of one event.
pub type EventHandler = Arc<dyn Fn(&Context, &[u8]) -> Result<(), HandlerError> + Send + Sync>;

/// Builds a [`Dispatcher`], validating handler names against the registry.
pub struct DispatcherBuilder {
    registry: Arc<EventRegistry>,
    handlers: HashMap<String, EventHandler>,
}

impl DispatcherBuilder {
    /// Register the implementation of a handler declared in the schema.
    /// Registering a name twice keeps the last implementation.
    pub fn register<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Context, &[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Finish the dispatch table.
    ///
    /// Fails if a registered name is not declared in the schema.
    /// Declared handlers without an implementation are logged.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let mut registered: Vec<&String> = self.handlers.keys().collect();
        registered.sort();
        for name in registered {
            if !self.registry.has_handler(name) {
                return Err(DispatchError::UndeclaredHandler(name.clone()));
            }
        }

        for name in self.registry.handler_names() {
            if !self.handlers.contains_key(&name) {
                warn!(handler = %name, "declared handler has no implementation");
            }
        }

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                registry: self.registry,
                handlers: self.handlers,
            }),
        })
    }
}

struct Inner {
    registry: Arc<EventRegistry>,
    handlers: HashMap<String, EventHandler>,
}

/// Routes an event type to its configured handler implementation.
///
/// Event types without a configured or implemented handler are not errors:
/// they are logged and reported as handled, so older consumers keep working
/// while new event types roll out.
///
/// ```
/// use std::sync::Arc;
/// use relaybus::events::{Dispatcher, EventConfig, EventRegistry, EventSchema, HandlerConfig, TopicConfig};
/// use relaybus::Context;
///
/// let schema = EventSchema::default()
///     .with_topic("lifecycle", TopicConfig::new("q.lifecycle", "worker"))
///     .with_event("scale.published", EventConfig::new("lifecycle", "on_scale"))
///     .with_handler("on_scale", HandlerConfig::default());
/// let registry = Arc::new(EventRegistry::from_schema(schema).unwrap());
///
/// let dispatcher = Dispatcher::builder(registry)
///     .register("on_scale", |_ctx: &Context, payload: &[u8]| {
///         assert_eq!(payload, b"{}");
///         Ok(())
///     })
///     .build()
///     .unwrap();
/// dispatcher.dispatch(&Context::new(), "scale.published", b"{}").unwrap();
/// dispatcher.dispatch(&Context::new(), "never.declared", b"{}").unwrap();
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.inner.handlers.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher").field("handlers", &names).finish()
    }
}

impl Dispatcher {
    pub fn builder(registry: Arc<EventRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            handlers: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.inner.registry
    }

    /// Whether an implementation is registered under `name`.
    pub fn has_handler(&self, name: &str) -> bool {
        self.inner.handlers.contains_key(name)
    }

    /// Invoke the handler configured for `event_type` with `payload`.
    ///
    /// Handler errors are returned unchanged.
    pub fn dispatch(&self, ctx: &Context, event_type: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let Some(name) = self.inner.registry.handler_for_event(event_type) else {
            debug!(event_type, "no handler configured for event type, skipping");
            return Ok(());
        };
        let Some(handler) = self.inner.handlers.get(&name) else {
            debug!(event_type, handler = %name, "handler not implemented, skipping");
            return Ok(());
        };
        handler(ctx, payload)
    }

    /// Dispatch a delivered message.
    ///
    /// The event type comes from the `event_type` metadata key, falling back
    /// to the `event_type` field of a JSON envelope payload.
    pub fn dispatch_message(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let event_type = match message.event_type() {
            Some(event_type) => event_type.to_string(),
            None => match peek_event_type(&message.payload) {
                Some(event_type) => event_type,
                None => {
                    warn!(id = %message.id, "cannot resolve event type, skipping message");
                    return Ok(());
                }
            },
        };
        self.dispatch(ctx, &event_type, &message.payload)
    }

    /// Adapt the dispatcher into a subscriber [`Handler`].
    pub fn handler(&self) -> Handler {
        let dispatcher = self.clone();
        Arc::new(move |ctx: &Context, msg: &Message| dispatcher.dispatch_message(ctx, msg))
    }
}

/// Register handler modules with a [`DispatcherBuilder`] by convention.
///
/// Each handler module must export:
/// - `HANDLER: &str`, the handler name declared in the schema
/// - `handle(ctx: &Context, payload: &[u8]) -> Result<(), HandlerError>`
///
/// # Example
/// ```ignore
/// let dispatcher = relaybus::register_handlers!(
///     Dispatcher::builder(registry),
///     handlers::scale_published,
///     handlers::sheet_saved,
/// )
/// .build()?;
/// ```
#[macro_export]
macro_rules! register_handlers {
    ($builder:expr, $( $($seg:ident)::+ ),+ $(,)?) => {
        $builder
        $(
            .register(
                $($seg)::+::HANDLER,
                $($seg)::+::handle,
            )
        )+
    };
}
