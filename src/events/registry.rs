//! Cached event-type / topic lookups built from an [`EventSchema`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::error::ConfigError;
use super::schema::{EventConfig, EventSchema, HandlerConfig, TopicConfig};

#[derive(Default)]
struct Cache {
    schema: EventSchema,
    /// event type -> physical topic name
    event_topics: HashMap<String, String>,
    /// physical topic name -> event types (sorted)
    topic_events: HashMap<String, Vec<String>>,
}

impl Cache {
    fn build(schema: EventSchema) -> Self {
        let mut event_topics = HashMap::new();
        let mut topic_events: HashMap<String, Vec<String>> = HashMap::new();

        // `events` is a BTreeMap, so every per-topic list comes out sorted.
        for (event_type, event) in &schema.events {
            if let Some(topic) = schema.topics.get(&event.topic) {
                event_topics.insert(event_type.clone(), topic.name.clone());
                topic_events
                    .entry(topic.name.clone())
                    .or_default()
                    .push(event_type.clone());
            }
        }

        Self {
            schema,
            event_topics,
            topic_events,
        }
    }
}

/// Event configuration registry.
///
/// Each successful [`load`](EventRegistry::load) swaps in a new cache in one
/// step; readers see either the previous configuration or the new one. A
/// failed load leaves the previous configuration in place.
#[derive(Default)]
pub struct EventRegistry {
    cache: RwLock<Arc<Cache>>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.event_types())
            .finish()
    }
}

impl EventRegistry {
    /// An empty registry; every lookup returns `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a schema.
    pub fn from_schema(schema: EventSchema) -> Result<Self, ConfigError> {
        let registry = Self::new();
        registry.load(schema)?;
        Ok(registry)
    }

    /// Validate `schema` and replace the current configuration with it.
    pub fn load(&self, schema: EventSchema) -> Result<(), ConfigError> {
        schema.validate()?;
        let cache = Arc::new(Cache::build(schema));
        info!(
            topics = cache.schema.topics.len(),
            events = cache.schema.events.len(),
            handlers = cache.schema.handlers.len(),
            "event configuration loaded"
        );
        *self.cache.write() = cache;
        Ok(())
    }

    fn snapshot(&self) -> Arc<Cache> {
        Arc::clone(&self.cache.read())
    }

    /// Physical topic name an event type is published to.
    pub fn get_topic_for_event(&self, event_type: &str) -> Option<String> {
        self.snapshot().event_topics.get(event_type).cloned()
    }

    /// Event types routed to a physical topic, sorted.
    pub fn get_events_for_topic(&self, topic_name: &str) -> Option<Vec<String>> {
        self.snapshot().topic_events.get(topic_name).cloned()
    }

    pub fn event_config(&self, event_type: &str) -> Option<EventConfig> {
        self.snapshot().schema.events.get(event_type).cloned()
    }

    /// Topic by topic key.
    pub fn topic_config(&self, key: &str) -> Option<TopicConfig> {
        self.snapshot().schema.topics.get(key).cloned()
    }

    pub fn handler_config(&self, name: &str) -> Option<HandlerConfig> {
        self.snapshot().schema.handlers.get(name).cloned()
    }

    /// Handler name configured for an event type.
    pub fn handler_for_event(&self, event_type: &str) -> Option<String> {
        self.snapshot()
            .schema
            .events
            .get(event_type)
            .map(|event| event.handler.clone())
    }

    /// All topics as (key, config), sorted by key.
    pub fn topics(&self) -> Vec<(String, TopicConfig)> {
        self.snapshot()
            .schema
            .topics
            .iter()
            .map(|(key, topic)| (key.clone(), topic.clone()))
            .collect()
    }

    /// Declared event types, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.snapshot().schema.events.keys().cloned().collect()
    }

    /// Declared handler names, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        self.snapshot().schema.handlers.keys().cloned().collect()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.snapshot().schema.handlers.contains_key(name)
    }

    pub fn version(&self) -> String {
        self.snapshot().schema.version.clone()
    }
}
