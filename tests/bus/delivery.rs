//! Delivery semantics: broadcast, competing consumers, settlement.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use relaybus::bus::{InMemoryBus, InMemoryConfig, Publisher, SubscribeOptions, Subscriber};
use relaybus::message::Outcome;
use relaybus::{handler_fn, HandlerError, Message};

use crate::support::{eventually, WAIT};

#[test]
fn every_group_receives_every_message() {
    let bus = InMemoryBus::new();
    let indexer = Arc::new(AtomicU32::new(0));
    let mailer = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&indexer);
    bus.subscribe("q.sheets", "indexer", handler_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
    .unwrap();
    let counter = Arc::clone(&mailer);
    bus.subscribe("q.sheets", "mailer", handler_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
    .unwrap();

    for i in 0..5 {
        bus.publish_message("q.sheets", Message::with_id(format!("m-{i}"), Vec::new()))
            .unwrap();
    }

    assert!(bus.wait_idle(WAIT));
    assert_eq!(indexer.load(Ordering::SeqCst), 5);
    assert_eq!(mailer.load(Ordering::SeqCst), 5);
    assert_eq!(bus.acked_ids().len(), 10);
    bus.stop();
}

#[test]
fn workers_in_one_group_compete() {
    let bus = InMemoryBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    bus.subscribe_with(
        "q.scores",
        "scorer",
        SubscribeOptions::concurrency(4),
        handler_fn(move |_, msg| {
            thread::sleep(Duration::from_millis(5));
            sink.lock().push(msg.id.clone());
            Ok(())
        }),
    )
    .unwrap();

    for i in 0..20 {
        bus.publish_message("q.scores", Message::with_id(format!("m-{i}"), Vec::new()))
            .unwrap();
    }

    assert!(bus.wait_idle(WAIT));
    let seen = seen.lock();
    assert_eq!(seen.len(), 20);
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), 20);
    bus.stop();
}

#[test]
fn handler_settlement_is_not_overridden() {
    let bus = InMemoryBus::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    bus.subscribe("q.audit", "auditor", handler_fn(move |_, msg| {
        assert!(msg.acknowledge());
        assert!(!msg.reject());
        sink.lock().push(msg.outcome());
        Err(HandlerError::Rejected("returned after ack".into()))
    }))
    .unwrap();
    bus.publish_message("q.audit", Message::with_id("m-1", Vec::new()))
        .unwrap();

    assert!(bus.wait_idle(WAIT));
    assert_eq!(*observed.lock(), vec![Outcome::Acked]);
    assert_eq!(bus.acked_ids(), vec!["m-1".to_string()]);
    assert!(bus.rejected_ids().is_empty());
    bus.stop();
}

#[test]
fn messages_published_while_stopped_wait_for_the_next_subscription() {
    let bus = InMemoryBus::new();
    bus.subscribe("q.lifecycle", "worker", handler_fn(|_, _| Ok(())))
        .unwrap();
    bus.stop();

    bus.publish_message("q.lifecycle", Message::with_id("late", Vec::new()))
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(bus.pending("q.lifecycle", "worker"), 1);

    bus.subscribe("q.lifecycle", "worker", handler_fn(|_, _| Ok(())))
        .unwrap();
    assert!(eventually(WAIT, || bus.acked_ids() == vec!["late".to_string()]));
    bus.stop();
}

#[test]
fn dead_letters_after_max_deliveries() {
    let bus = InMemoryBus::with_config(InMemoryConfig {
        max_deliveries: 2,
        ..Default::default()
    });
    bus.subscribe("q.broken", "worker", handler_fn(|_, _| {
        Err(HandlerError::DecodeFailed("bad json".into()))
    }))
    .unwrap();
    bus.publish_message("q.broken", Message::with_id("poison", Vec::new()))
        .unwrap();

    assert!(bus.wait_idle(WAIT));
    assert_eq!(bus.rejected_ids(), vec!["poison".to_string(), "poison".to_string()]);
    assert_eq!(bus.dead_letters().len(), 1);
    bus.stop();
}

#[test]
fn stop_from_a_handler_does_not_deadlock() {
    let bus = InMemoryBus::new();
    let inner = bus.clone();
    bus.subscribe("q.control", "worker", handler_fn(move |_, _| {
        inner.stop();
        Ok(())
    }))
    .unwrap();
    bus.publish("q.control", Vec::new()).unwrap();

    assert!(eventually(WAIT, || bus.acked_ids().len() == 1));
}
