//! Domain event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;
use super::metadata_keys;

/// A domain event together with its identity and provenance.
///
/// `into_message` serializes the envelope as the JSON payload and mirrors
/// the identity fields into metadata, so consumers can route on metadata
/// without decoding the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl EventEnvelope {
    /// Create an envelope occurring now.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            aggregate_type: None,
            aggregate_id: None,
            occurred_at: Utc::now(),
            source: None,
            data,
        }
    }

    /// Set the aggregate identity.
    pub fn with_aggregate(
        mut self,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
    ) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self.aggregate_id = Some(aggregate_id.into());
        self
    }

    /// Set the producing source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Serialize into a message with a generated id.
    pub fn into_message(self) -> Result<Message, serde_json::Error> {
        let payload = serde_json::to_vec(&self)?;
        let mut message = Message::new(payload)
            .with_metadata(metadata_keys::EVENT_TYPE, self.event_type)
            .with_metadata(metadata_keys::OCCURRED_AT, self.occurred_at.to_rfc3339());
        if let Some(aggregate_type) = self.aggregate_type {
            message = message.with_metadata(metadata_keys::AGGREGATE_TYPE, aggregate_type);
        }
        if let Some(aggregate_id) = self.aggregate_id {
            message = message.with_metadata(metadata_keys::AGGREGATE_ID, aggregate_id);
        }
        if let Some(source) = self.source {
            message = message.with_metadata(metadata_keys::SOURCE, source);
        }
        Ok(message)
    }

    /// Decode an envelope from a message payload.
    pub fn from_message(message: &Message) -> Result<Self, serde_json::Error> {
        message.decode_json()
    }
}

/// Read only the `event_type` field of a JSON envelope payload.
pub(crate) fn peek_event_type(payload: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct Peek {
        event_type: String,
    }

    serde_json::from_slice::<Peek>(payload)
        .ok()
        .map(|peek| peek.event_type)
}
