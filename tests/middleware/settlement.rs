//! Every delivery is acknowledged or rejected exactly once, whatever path
//! the middleware chain takes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relaybus::bus::{InMemoryBus, InMemoryConfig, Publisher, Subscriber};
use relaybus::middleware::{
    compose, Deduplication, Filter, Recover, Retry, RetryPolicy, SharedMiddleware, Timeout,
};
use relaybus::{handler_fn, Handler, HandlerError, Message};

use crate::support::{eventually, WAIT};

fn single_delivery_bus() -> InMemoryBus {
    InMemoryBus::with_config(InMemoryConfig {
        max_deliveries: 1,
        ..Default::default()
    })
}

fn run_one(bus: &InMemoryBus, topic: &str, handler: Handler, id: &str) {
    bus.subscribe(topic, "worker", handler).unwrap();
    bus.publish_message(topic, Message::with_id(id, Vec::new()))
        .unwrap();
    assert!(bus.wait_idle(WAIT));
}

#[test]
fn panic_is_rejected_once() {
    let bus = single_delivery_bus();
    let chain: Vec<SharedMiddleware> = vec![Arc::new(Recover::new())];
    run_one(&bus, "q.panic", compose(handler_fn(|_, _| panic!("boom")), &chain), "m-1");

    assert_eq!(bus.rejected_ids(), vec!["m-1".to_string()]);
    assert!(bus.acked_ids().is_empty());
    bus.stop();
}

#[test]
fn timed_out_handler_cannot_settle_later() {
    let bus = single_delivery_bus();
    let late_ack = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&late_ack);
    let chain: Vec<SharedMiddleware> = vec![Arc::new(Timeout::new(Duration::from_millis(20)))];
    let slow = handler_fn(move |_, msg| {
        thread::sleep(Duration::from_millis(100));
        flag.store(msg.acknowledge(), Ordering::SeqCst);
        Ok(())
    });
    run_one(&bus, "q.slow", compose(slow, &chain), "m-1");

    assert_eq!(bus.rejected_ids(), vec!["m-1".to_string()]);
    assert!(eventually(WAIT, || !late_ack.load(Ordering::SeqCst)));
    assert!(bus.acked_ids().is_empty());
    bus.stop();
}

#[test]
fn retried_success_is_acked_once() {
    let bus = single_delivery_bus();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let chain: Vec<SharedMiddleware> = vec![Arc::new(Retry::new(RetryPolicy::fixed(
        3,
        Duration::from_millis(1),
    )))];
    let flaky = handler_fn(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(HandlerError::Rejected("transient".into()))
        } else {
            Ok(())
        }
    });
    run_one(&bus, "q.flaky", compose(flaky, &chain), "m-1");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(bus.acked_ids(), vec!["m-1".to_string()]);
    assert!(bus.rejected_ids().is_empty());
    bus.stop();
}

#[test]
fn retry_bound_rejects_with_last_error() {
    let bus = single_delivery_bus();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let chain: Vec<SharedMiddleware> = vec![Arc::new(Retry::new(RetryPolicy::fixed(
        2,
        Duration::from_millis(1),
    )))];
    let failing = handler_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Rejected("permanent".into()))
    });
    run_one(&bus, "q.failing", compose(failing, &chain), "m-1");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(bus.rejected_ids(), vec!["m-1".to_string()]);
    bus.stop();
}

#[test]
fn filtered_messages_are_acked_without_the_handler() {
    let bus = single_delivery_bus();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let chain: Vec<SharedMiddleware> = vec![Arc::new(Filter::metadata_equals("tenant", "acme"))];
    bus.subscribe(
        "q.tenants",
        "worker",
        compose(
            handler_fn(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            &chain,
        ),
    )
    .unwrap();

    bus.publish_message("q.tenants", Message::with_id("a", Vec::new()).with_metadata("tenant", "acme"))
        .unwrap();
    bus.publish_message("q.tenants", Message::with_id("b", Vec::new()).with_metadata("tenant", "globex"))
        .unwrap();

    assert!(bus.wait_idle(WAIT));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let mut acked = bus.acked_ids();
    acked.sort();
    assert_eq!(acked, vec!["a".to_string(), "b".to_string()]);
    bus.stop();
}

#[test]
fn duplicates_are_processed_once_and_acked_every_time() {
    let bus = single_delivery_bus();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let chain: Vec<SharedMiddleware> =
        vec![Arc::new(Deduplication::in_memory(Duration::from_secs(60)))];
    bus.subscribe(
        "q.orders",
        "worker",
        compose(
            handler_fn(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            &chain,
        ),
    )
    .unwrap();

    for _ in 0..3 {
        bus.publish_message("q.orders", Message::with_id("order-7", b"{}".to_vec()))
            .unwrap();
    }

    assert!(bus.wait_idle(WAIT));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.acked_ids().len(), 3);
    assert!(bus.rejected_ids().is_empty());
    bus.stop();
}
