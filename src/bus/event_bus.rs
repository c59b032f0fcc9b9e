//! Combined trait for bidirectional bus communication.

use super::publisher::Publisher;
use super::subscriber::Subscriber;
use super::BusError;

/// A full broker adapter: publisher, subscriber and a liveness probe.
pub trait EventBus: Publisher + Subscriber {
    /// Lightweight connectivity check against the transport.
    fn health(&self) -> Result<(), BusError>;
}
