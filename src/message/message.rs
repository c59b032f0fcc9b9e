//! The message envelope crossing the publish/subscribe boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::metadata_keys;

/// Terminal outcome of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Neither acknowledged nor rejected yet.
    Pending,
    /// Processed; the broker must not redeliver it.
    Acked,
    /// Failed; the broker applies its redelivery policy.
    Rejected,
}

const PENDING: u8 = 0;
const ACKED: u8 = 1;
const REJECTED: u8 = 2;

/// Hook an adapter wires into delivered messages.
///
/// Each method is invoked at most once per delivery, and never both.
pub trait Acknowledger: Send + Sync {
    /// The message was processed successfully.
    fn acknowledge(&self, message: &Message);

    /// The message failed and should be handed to the redelivery policy.
    fn reject(&self, message: &Message);
}

/// Settlement state shared by every clone of one delivery.
struct Settlement {
    state: AtomicU8,
    acker: Option<Arc<dyn Acknowledger>>,
}

impl Settlement {
    fn unwired() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(PENDING),
            acker: None,
        })
    }
}

/// A message on the bus.
///
/// `id`, `metadata` and `payload` are owned by the producer. Provenance
/// fields (`attempts`, `timestamp`, `topic`, `channel`) are set by the
/// adapter when the message is delivered.
#[derive(Clone)]
pub struct Message {
    /// Unique identifier for this message
    pub id: String,
    /// String metadata (event type, trace id, business keys, ...)
    pub metadata: HashMap<String, String>,
    /// Serialized payload (typically JSON or binary)
    pub payload: Vec<u8>,
    attempts: u32,
    timestamp: DateTime<Utc>,
    topic: Option<String>,
    channel: Option<String>,
    settlement: Arc<Settlement>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("payload_len", &self.payload.len())
            .field("attempts", &self.attempts)
            .field("timestamp", &self.timestamp)
            .field("topic", &self.topic)
            .field("channel", &self.channel)
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl Message {
    /// Create a message with a generated UUID v4 id.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    /// Create a message with an explicit id.
    pub fn with_id(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            metadata: HashMap::new(),
            payload: payload.into(),
            attempts: 0,
            timestamp: Utc::now(),
            topic: None,
            channel: None,
            settlement: Settlement::unwired(),
        }
    }

    /// Create a message with a bitcode-serialized payload.
    pub fn encode<T: serde::Serialize>(
        id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        Ok(Self::with_id(id, bytes))
    }

    /// Decode the payload from bitcode binary format.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    /// Create a message with a JSON payload.
    pub fn json<T: serde::Serialize>(
        id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::with_id(id, bytes))
    }

    /// Decode the payload as JSON.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the `event_type` metadata entry.
    pub fn with_event_type(self, event_type: impl Into<String>) -> Self {
        self.with_metadata(metadata_keys::EVENT_TYPE, event_type)
    }

    /// Look up a metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The `event_type` metadata value, if present.
    pub fn event_type(&self) -> Option<&str> {
        self.meta(metadata_keys::EVENT_TYPE)
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Delivery attempt counter (1 on first delivery, 0 if never delivered).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the message was created or delivered.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Topic the message was delivered from.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Consumer group / channel the message was delivered to.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Prepare a fresh delivery of this message for an adapter.
    ///
    /// Sets provenance and wires `acker`. The returned message has its own
    /// settlement state, independent of earlier deliveries.
    pub fn into_delivery(
        mut self,
        topic: impl Into<String>,
        channel: impl Into<String>,
        attempts: u32,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        self.topic = Some(topic.into());
        self.channel = Some(channel.into());
        self.attempts = attempts;
        self.timestamp = Utc::now();
        self.settlement = Arc::new(Settlement {
            state: AtomicU8::new(PENDING),
            acker: Some(acker),
        });
        self
    }

    /// Acknowledge the message.
    ///
    /// Returns `true` if this call settled the message. Later calls, calls
    /// after `reject`, and calls on a message with no adapter wired are
    /// no-ops returning `false`.
    pub fn acknowledge(&self) -> bool {
        self.settle(ACKED)
    }

    /// Reject the message. Same settlement rules as [`Message::acknowledge`].
    pub fn reject(&self) -> bool {
        self.settle(REJECTED)
    }

    /// Current settlement outcome.
    pub fn outcome(&self) -> Outcome {
        match self.settlement.state.load(Ordering::Acquire) {
            ACKED => Outcome::Acked,
            REJECTED => Outcome::Rejected,
            _ => Outcome::Pending,
        }
    }

    /// Whether the message has been acknowledged or rejected.
    pub fn is_settled(&self) -> bool {
        self.outcome() != Outcome::Pending
    }

    fn settle(&self, target: u8) -> bool {
        let Some(acker) = &self.settlement.acker else {
            return false;
        };
        if self
            .settlement
            .state
            .compare_exchange(PENDING, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if target == ACKED {
            acker.acknowledge(self);
        } else {
            acker.reject(self);
        }
        true
    }
}
