//! Publisher port.

use super::BusError;
use crate::message::Message;

/// Trait for publishing messages to a broker.
///
/// Implementations might include:
/// - `InMemoryBus` - For testing and single-process scenarios
/// - an NSQ, Kafka or RabbitMQ adapter living in its own crate
///
/// No buffering or retry happens at this layer; wrap the producer in
/// whatever retry policy the caller needs.
pub trait Publisher: Send + Sync {
    /// Publish raw bytes as a new message with a generated id.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.publish_message(topic, Message::new(payload))
    }

    /// Publish a fully built message.
    fn publish_message(&self, topic: &str, message: Message) -> Result<(), BusError>;

    /// Publish multiple messages to one topic.
    ///
    /// Default implementation publishes messages sequentially and stops at
    /// the first failure. Implementations may override for batch optimization.
    fn publish_batch(&self, topic: &str, messages: Vec<Message>) -> Result<(), BusError> {
        for message in messages {
            self.publish_message(topic, message)?;
        }
        Ok(())
    }

    /// Release transport resources. Later publishes fail with
    /// [`BusError::Closed`].
    fn close(&self) -> Result<(), BusError>;
}
