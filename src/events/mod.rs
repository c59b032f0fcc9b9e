//! Config-driven event routing.
//!
//! An [`EventSchema`] declares topics, event types and handler names. The
//! [`EventRegistry`] validates it and caches event-type → topic lookups, and
//! a [`Dispatcher`] maps each inbound event type to the handler function
//! registered for it.

mod dispatcher;
mod error;
mod registry;
mod schema;

pub use dispatcher::{Dispatcher, DispatcherBuilder, EventHandler};
pub use error::{ConfigError, DispatchError};
pub use registry::EventRegistry;
pub use schema::{EventConfig, EventSchema, HandlerConfig, TopicConfig};
