//! Dispatching payloads to registered handler functions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relaybus::events::{DispatchError, Dispatcher};
use relaybus::{register_handlers, Context, EventEnvelope, HandlerError, Message};
use serde_json::json;

use crate::fixture_registry;
use crate::handlers::{answersheet_saved, scale_published};

#[test]
fn scenario_spy_is_invoked_once_with_payload() {
    let registry = fixture_registry();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let spy = Arc::clone(&seen);
    let dispatcher = Dispatcher::builder(Arc::clone(&registry))
        .register("scale_published_handler", move |_: &Context, payload: &[u8]| {
            spy.lock().push(payload.to_vec());
            Ok(())
        })
        .build()
        .unwrap();

    assert_eq!(
        registry.get_topic_for_event("scale.published").as_deref(),
        Some("q.lifecycle")
    );
    dispatcher
        .dispatch(&Context::new(), "scale.published", br#"{"scale_id":"phq-9"}"#)
        .unwrap();
    assert_eq!(*seen.lock(), vec![br#"{"scale_id":"phq-9"}"#.to_vec()]);
}

#[test]
fn unknown_event_type_is_a_no_op() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let dispatcher = Dispatcher::builder(fixture_registry())
        .register("scale_published_handler", move |_: &Context, _: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();

    assert!(dispatcher
        .dispatch(&Context::new(), "report.generated", b"{}")
        .is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn convention_modules_register_through_the_macro() {
    let dispatcher = register_handlers!(
        Dispatcher::builder(fixture_registry()),
        scale_published,
        answersheet_saved,
    )
    .build()
    .unwrap();

    let ctx = Context::new();
    assert!(dispatcher
        .dispatch(&ctx, "scale.published", br#"{"scale_id":"gad-7"}"#)
        .is_ok());
    assert!(matches!(
        dispatcher.dispatch(&ctx, "scale.published", b"{}"),
        Err(HandlerError::Rejected(_))
    ));
    assert!(matches!(
        dispatcher.dispatch(&ctx, "scale.published", b"not json"),
        Err(HandlerError::DecodeFailed(_))
    ));
    // Declared but not implemented.
    assert!(dispatcher.dispatch(&ctx, "scale.archived", b"{}").is_ok());
}

#[test]
fn undeclared_handler_fails_closed() {
    let result = Dispatcher::builder(fixture_registry())
        .register("scale_deleted_handler", |_: &Context, _: &[u8]| Ok(()))
        .build();
    assert!(matches!(
        result,
        Err(DispatchError::UndeclaredHandler(ref name)) if name == "scale_deleted_handler"
    ));
}

#[test]
fn envelope_messages_resolve_without_metadata() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let dispatcher = Dispatcher::builder(fixture_registry())
        .register("answersheet_saved_handler", move |_: &Context, payload: &[u8]| {
            let envelope: EventEnvelope = serde_json::from_slice(payload)?;
            assert_eq!(envelope.aggregate_id.as_deref(), Some("sheet-1"));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();

    let mut message = EventEnvelope::new("answersheet.saved", json!({"answers": 12}))
        .with_aggregate("answersheet", "sheet-1")
        .into_message()
        .unwrap();
    message.metadata.clear();

    let handler = dispatcher.handler();
    handler(&Context::new(), &message).unwrap();
    handler(&Context::new(), &Message::new(b"opaque".to_vec())).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
