pub mod bus;
mod context;
mod error;
pub mod events;
mod handler;
pub mod message;
pub mod middleware;
pub mod provider;
pub mod router;

pub use context::Context;
pub use error::HandlerError;
pub use handler::{handler_fn, Handler};
pub use message::{EventEnvelope, Message};

pub use bus::{BusError, EventBus, Publisher, SubscribeOptions, Subscriber};
#[cfg(feature = "memory")]
pub use bus::{InMemoryBus, InMemoryConfig};
pub use events::{Dispatcher, EventRegistry, EventSchema};
pub use middleware::{compose, Middleware, SharedMiddleware};
pub use provider::{BusConfig, ProviderRegistry};
pub use router::Router;
