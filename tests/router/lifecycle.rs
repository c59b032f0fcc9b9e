//! Running, stopping and dispatcher binding.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relaybus::bus::{InMemoryBus, Publisher};
use relaybus::events::{Dispatcher, EventRegistry, EventSchema};
use relaybus::router::{Router, RouterError};
use relaybus::{handler_fn, Context, EventEnvelope, HandlerError};
use serde_json::json;

use crate::support::{eventually, WAIT};

fn registry() -> Arc<EventRegistry> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/events.toml");
    Arc::new(EventRegistry::from_schema(EventSchema::from_path(path).unwrap()).unwrap())
}

#[test]
fn dispatcher_is_bound_to_every_configured_topic() {
    let registry = registry();
    let published = Arc::new(AtomicU32::new(0));
    let attempts = Arc::new(AtomicU32::new(0));
    let (published_calls, archived_calls) = (Arc::clone(&published), Arc::clone(&attempts));

    let dispatcher = Dispatcher::builder(Arc::clone(&registry))
        .register("scale_published_handler", move |_: &Context, _: &[u8]| {
            published_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .register("scale_archived_handler", move |_: &Context, _: &[u8]| {
            // Fails once, then succeeds on the topic's retry.
            if archived_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HandlerError::Rejected("cache busy".into()))
            } else {
                Ok(())
            }
        })
        .build()
        .unwrap();

    let bus = InMemoryBus::new();
    let mut router = Router::new(Arc::new(bus.clone()));
    router.add_dispatcher(&registry, &dispatcher);
    assert_eq!(
        router.registrations(),
        vec![
            ("q.answers".to_string(), "scorer".to_string()),
            ("q.lifecycle".to_string(), "worker".to_string()),
        ]
    );
    let router = Arc::new(router);

    let ctx = Context::new();
    let runner = {
        let (router, ctx) = (Arc::clone(&router), ctx.clone());
        thread::spawn(move || router.run(&ctx))
    };
    assert!(eventually(WAIT, || router.is_running()));
    thread::sleep(Duration::from_millis(50));

    for event_type in ["scale.published", "scale.archived"] {
        let topic = registry.get_topic_for_event(event_type).unwrap();
        let message = EventEnvelope::new(event_type, json!({"scale_id": "phq-9"}))
            .into_message()
            .unwrap();
        bus.publish_message(&topic, message).unwrap();
    }
    let unknown = EventEnvelope::new("scale.renamed", json!({})).into_message().unwrap();
    bus.publish_message("q.lifecycle", unknown).unwrap();

    assert!(eventually(WAIT, || bus.acked_ids().len() == 3));
    assert_eq!(published.load(Ordering::SeqCst), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(bus.rejected_ids().is_empty());

    router.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn stop_twice_is_harmless() {
    let bus = InMemoryBus::new();
    let mut router = Router::new(Arc::new(bus.clone()));
    router.add_handler("q.audit", "auditor", handler_fn(|_, _| Ok(())));
    let router = Arc::new(router);

    let runner = {
        let router = Arc::clone(&router);
        thread::spawn(move || router.run(&Context::new()))
    };
    assert!(eventually(WAIT, || router.is_running()));

    router.stop();
    router.stop();
    runner.join().unwrap().unwrap();
    assert!(!router.is_running());
    assert!(matches!(router.run(&Context::new()), Err(RouterError::AlreadyRunning)));
}

#[test]
fn run_fails_fast_on_a_closed_transport() {
    let bus = InMemoryBus::new();
    Publisher::close(&bus).unwrap();

    let mut router = Router::new(Arc::new(bus));
    router.add_handler("q.audit", "auditor", handler_fn(|_, _| Ok(())));

    let err = router.run(&Context::new()).unwrap_err();
    assert!(matches!(err, RouterError::Subscribe { ref topic, .. } if topic == "q.audit"));
}
