//! Declarative event / topic / handler schema.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::middleware::RetryPolicy;

fn default_concurrency() -> usize {
    1
}

/// A logical topic, keyed by its topic key in [`EventSchema::topics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Physical topic name on the broker.
    pub name: String,
    /// Consumer group the dispatcher subscribes with.
    #[serde(default)]
    pub group: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            concurrency: default_concurrency(),
            retry: None,
        }
    }
}

/// Routing for one event type, keyed by event type in [`EventSchema::events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Topic key in [`EventSchema::topics`].
    pub topic: String,
    /// Handler name in [`EventSchema::handlers`].
    pub handler: String,
    #[serde(default)]
    pub aggregate: String,
    #[serde(default)]
    pub domain: String,
    /// Scheduling hint, higher first.
    #[serde(default)]
    pub priority: i64,
}

impl EventConfig {
    pub fn new(topic: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            handler: handler.into(),
            aggregate: String::new(),
            domain: String::new(),
            priority: 0,
        }
    }
}

/// Catalogue entry for a handler implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub description: String,
}

/// The full event configuration document.
///
/// ```
/// use relaybus::events::EventSchema;
///
/// let schema = EventSchema::from_toml_str(r#"
/// [topics.lifecycle]
/// name = "q.lifecycle"
/// group = "worker"
///
/// [events."scale.published"]
/// topic = "lifecycle"
/// handler = "scale_published_handler"
///
/// [handlers.scale_published_handler]
/// package = "scale::handlers"
/// "#).unwrap();
/// assert_eq!(schema.topics["lifecycle"].name, "q.lifecycle");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSchema {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub topics: BTreeMap<String, TopicConfig>,
    #[serde(default)]
    pub events: BTreeMap<String, EventConfig>,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
}

impl EventSchema {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a `.toml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&fs::read_to_string(path)?),
            Some("json") => Self::from_json_str(&fs::read_to_string(path)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn with_topic(mut self, key: impl Into<String>, topic: TopicConfig) -> Self {
        self.topics.insert(key.into(), topic);
        self
    }

    pub fn with_event(mut self, event_type: impl Into<String>, event: EventConfig) -> Self {
        self.events.insert(event_type.into(), event);
        self
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: HandlerConfig) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Check topic definitions and every event's references.
    ///
    /// Topics and events are checked in key order, so the first error is
    /// deterministic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, topic) in &self.topics {
            if topic.name.trim().is_empty() {
                return Err(ConfigError::InvalidTopic {
                    topic: key.clone(),
                    reason: "physical name is empty".into(),
                });
            }
            if topic.concurrency == 0 {
                return Err(ConfigError::InvalidTopic {
                    topic: key.clone(),
                    reason: "concurrency must be at least 1".into(),
                });
            }
        }

        for (event_type, event) in &self.events {
            if !self.topics.contains_key(&event.topic) {
                return Err(ConfigError::UnknownTopic {
                    event: event_type.clone(),
                    topic: event.topic.clone(),
                });
            }
            if !self.handlers.contains_key(&event.handler) {
                return Err(ConfigError::UnknownHandler {
                    event: event_type.clone(),
                    handler: event.handler.clone(),
                });
            }
        }
        Ok(())
    }
}
