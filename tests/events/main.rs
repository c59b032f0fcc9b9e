//! Event configuration and dispatch integration tests.

mod registry;
mod dispatch;

use std::path::PathBuf;
use std::sync::Arc;

use relaybus::events::{EventRegistry, EventSchema};

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/events.toml")
}

pub fn fixture_registry() -> Arc<EventRegistry> {
    let schema = EventSchema::from_path(fixture_path()).unwrap();
    Arc::new(EventRegistry::from_schema(schema).unwrap())
}
