//! Errors raised while loading event configuration or building a dispatcher.

use std::io;

use thiserror::Error;

/// Schema load / validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse event schema: {0}")]
    Parse(String),
    #[error("failed to read event schema: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported schema format: {0}")]
    UnsupportedFormat(String),
    #[error("event `{event}` references unknown topic `{topic}`")]
    UnknownTopic { event: String, topic: String },
    #[error("event `{event}` references unknown handler `{handler}`")]
    UnknownHandler { event: String, handler: String },
    #[error("invalid topic `{topic}`: {reason}")]
    InvalidTopic { topic: String, reason: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Dispatcher construction error.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler was registered under a name the schema does not declare.
    #[error("handler `{0}` is not declared in the event schema")]
    UndeclaredHandler(String),
}
