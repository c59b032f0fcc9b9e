//! Bus ports - broker-agnostic publishing and subscription.
//!
//! This module provides the traits a broker adapter implements, plus an
//! in-memory adapter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 EventBus (per adapter)                       │
//! │  Publisher + Subscriber + health()                          │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Publisher: publish(topic, bytes) / publish_message / close │
//! │  Subscriber: subscribe(topic, group, handler) / stop / close│
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │ InMemoryBus │    │ NsqAdapter  │    │    KafkaAdapter     │
//! │ (included)  │    │ (external)  │    │     (external)      │
//! └─────────────┘    └─────────────┘    └─────────────────────┘
//! ```
//!
//! ## Delivery contract
//!
//! Each delivered message is settled exactly once. Adapters run handlers
//! through [`deliver`], which acknowledges on `Ok` and rejects on `Err`
//! unless the handler settled the message itself.

mod error;
mod event_bus;
#[cfg(feature = "memory")]
mod in_memory_bus;
mod publisher;
mod subscriber;

pub use error::BusError;
pub use event_bus::EventBus;
#[cfg(feature = "memory")]
pub use in_memory_bus::{InMemoryBus, InMemoryConfig};
pub use publisher::Publisher;
pub use subscriber::{deliver, SubscribeOptions, Subscriber};
