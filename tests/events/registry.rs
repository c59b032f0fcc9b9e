//! Schema loading and lookups.

use relaybus::events::{ConfigError, EventConfig, EventRegistry, EventSchema};

use crate::{fixture_path, fixture_registry};

#[test]
fn every_declared_event_resolves() {
    let registry = fixture_registry();
    for event_type in registry.event_types() {
        assert!(
            registry.get_topic_for_event(&event_type).is_some(),
            "{event_type} did not resolve"
        );
    }
    assert_eq!(registry.version(), "1");
}

#[test]
fn lifecycle_scenario_lookups() {
    let registry = fixture_registry();
    assert_eq!(
        registry.get_topic_for_event("scale.published").as_deref(),
        Some("q.lifecycle")
    );
    assert_eq!(
        registry.get_events_for_topic("q.lifecycle"),
        Some(vec!["scale.archived".to_string(), "scale.published".to_string()])
    );

    let event = registry.event_config("scale.published").unwrap();
    assert_eq!(event.handler, "scale_published_handler");
    assert_eq!(event.priority, 5);

    let topic = registry.topic_config("lifecycle").unwrap();
    assert_eq!(topic.concurrency, 2);
    assert_eq!(topic.retry.map(|retry| retry.max_attempts), Some(3));
}

#[test]
fn dangling_topic_names_the_event() {
    let mut schema = EventSchema::from_path(fixture_path()).unwrap();
    schema.events.insert(
        "assessment.submitted".into(),
        EventConfig::new("assessments", "answersheet_saved_handler"),
    );

    let err = EventRegistry::from_schema(schema).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::UnknownTopic { ref event, ref topic }
            if event == "assessment.submitted" && topic == "assessments"
    ));
    assert!(err.to_string().contains("assessment.submitted"));
}

#[test]
fn first_dangling_event_in_sorted_order_is_reported() {
    let schema = EventSchema::from_toml_str(
        r#"
[topics.t]
name = "q.t"

[events."b.event"]
topic = "missing"
handler = "h"

[events."a.event"]
topic = "t"
handler = "missing"

[handlers.h]
"#,
    )
    .unwrap();

    assert!(matches!(
        schema.validate(),
        Err(ConfigError::UnknownHandler { ref event, .. }) if event == "a.event"
    ));
}

#[test]
fn json_schema_loads_the_same_routes() {
    let toml_schema = EventSchema::from_path(fixture_path()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&toml_schema).unwrap()).unwrap();

    let registry = EventRegistry::from_schema(EventSchema::from_path(&path).unwrap()).unwrap();
    assert_eq!(
        registry.get_topic_for_event("answersheet.saved").as_deref(),
        Some("q.answers")
    );
}
