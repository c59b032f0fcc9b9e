//! Error type returned by message handlers and middleware.

use std::error::Error;
use std::time::Duration;

use thiserror::Error;

use crate::bus::BusError;

/// Error type for handler and middleware operations.
///
/// Any `Err` returned from a handler makes the adapter reject the message
/// (unless the handler settled it itself).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the message.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Payload decode / deserialization failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// The handler did not finish before its deadline.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
    /// The handler panicked and the panic was contained.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// The circuit breaker is open; the handler was not invoked.
    #[error("circuit breaker is open")]
    CircuitOpen,
    /// No rate-limit token was available in drop mode.
    #[error("rate limit exceeded")]
    RateLimited,
    /// The delivery context was cancelled while waiting.
    #[error("cancelled")]
    Cancelled,
    /// A bus operation performed by the handler failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    /// Other error.
    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap any error as `HandlerError::Other`.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        HandlerError::Other(err.into())
    }

    /// Whether retrying the same message could plausibly succeed.
    ///
    /// Errors produced by protective middleware (open breaker, rate limit,
    /// cancellation) are not worth retrying in place.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HandlerError::CircuitOpen | HandlerError::RateLimited | HandlerError::Cancelled
        )
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

impl From<bitcode::Error> for HandlerError {
    fn from(err: bitcode::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}
