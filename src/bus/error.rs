//! Transport error type.

use thiserror::Error;

/// Error type for publish/subscribe operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport has been closed.
    #[error("bus is closed")]
    Closed,
    /// Connection to the broker failed.
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    /// The broker refused a publish.
    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
    /// Registering a consumer failed.
    #[error("subscribe to '{topic}' (group '{group}') failed: {reason}")]
    Subscribe {
        topic: String,
        group: String,
        reason: String,
    },
    /// Serialization of a message failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// Adapter options could not be parsed.
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}
