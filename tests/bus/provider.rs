//! Building buses through the provider registry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use relaybus::bus::{BusError, EventBus, InMemoryBus, Publisher, Subscriber};
use relaybus::provider::{BusConfig, ProviderError, ProviderRegistry};
use relaybus::handler_fn;

use crate::support::{eventually, WAIT};

#[test]
fn memory_provider_from_toml_config() {
    let config = BusConfig::from_toml_str(
        r#"
provider = "memory"

[options]
concurrency = "2"
max_deliveries = "1"
"#,
    )
    .unwrap();
    let registry = ProviderRegistry::with_defaults();
    let bus = registry.create(&config).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    bus.subscribe("q.lifecycle", "worker", handler_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
    .unwrap();
    bus.publish("q.lifecycle", b"{}".to_vec()).unwrap();

    assert!(eventually(WAIT, || calls.load(Ordering::SeqCst) == 1));
    assert!(bus.health().is_ok());
    Subscriber::close(bus.as_ref()).unwrap();
    assert!(matches!(bus.health(), Err(BusError::Closed)));
}

#[test]
fn invalid_options_fail_the_build() {
    let registry = ProviderRegistry::with_defaults();
    let config = BusConfig::new("memory").with_option("concurrency", "many");
    assert!(matches!(
        registry.create(&config),
        Err(ProviderError::Build { ref provider, .. }) if provider == "memory"
    ));
}

#[test]
fn custom_provider_is_selected_by_name() {
    let registry = ProviderRegistry::new();
    let shared = InMemoryBus::new();
    let handle = shared.clone();
    registry
        .register("shared", move |_: &BusConfig| Ok(Arc::new(handle.clone()) as Arc<dyn EventBus>))
        .unwrap();

    let bus = registry.create(&BusConfig::new("shared")).unwrap();
    bus.publish("q.audit", b"entry".to_vec()).unwrap();
    assert_eq!(shared.published("q.audit").len(), 1);

    let err = registry.create(&BusConfig::new("kafka")).err().unwrap();
    assert!(err.to_string().contains("kafka"));
    assert!(err.to_string().contains("shared"));
}
