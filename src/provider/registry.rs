//! Provider registry for pluggable bus backends.
//!
//! Maps provider names to factories. Populated once during start-up and
//! then used read-only to build buses from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use super::BusConfig;
use crate::bus::{BusError, EventBus};

/// Builds a bus from its configuration.
pub type ProviderFactory = Arc<dyn Fn(&BusConfig) -> Result<Arc<dyn EventBus>, BusError> + Send + Sync>;

/// Error type for provider registration and lookup.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A provider with this name is already registered.
    #[error("provider '{0}' is already registered")]
    Duplicate(String),
    /// No provider with this name is registered.
    #[error("unknown bus provider '{provider}' (known providers: {})", .known.join(", "))]
    Unknown { provider: String, known: Vec<String> },
    /// The factory failed to build the bus.
    #[error("provider '{provider}' failed to build bus: {source}")]
    Build {
        provider: String,
        #[source]
        source: BusError,
    },
}

/// Registry of bus providers.
///
/// ## Example
///
/// ```
/// use relaybus::bus::EventBus;
/// use relaybus::provider::{BusConfig, ProviderRegistry};
///
/// let registry = ProviderRegistry::with_defaults();
/// let bus = registry.create(&BusConfig::new("memory")).unwrap();
/// assert!(bus.health().is_ok());
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in providers registered.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        #[cfg(feature = "memory")]
        registry.register_builtin_memory();
        registry
    }

    #[cfg(feature = "memory")]
    fn register_builtin_memory(&self) {
        use crate::bus::{InMemoryBus, InMemoryConfig};

        let factory: ProviderFactory = Arc::new(|config: &BusConfig| {
            let options = InMemoryConfig::from_options(&config.options)?;
            Ok(Arc::new(InMemoryBus::with_config(options)) as Arc<dyn EventBus>)
        });
        self.factories
            .write()
            .insert(crate::provider::MEMORY_PROVIDER.to_string(), factory);
    }

    /// Register a provider factory.
    ///
    /// Fails if `name` is already registered; registration is a start-up
    /// wiring step, not something to recover from at runtime.
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<(), ProviderError>
    where
        F: Fn(&BusConfig) -> Result<Arc<dyn EventBus>, BusError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) {
            return Err(ProviderError::Duplicate(name));
        }
        info!(provider = %name, "registered bus provider");
        factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Build a bus for `config.provider`.
    pub fn create(&self, config: &BusConfig) -> Result<Arc<dyn EventBus>, ProviderError> {
        let factory = self.factories.read().get(&config.provider).cloned();
        let factory = factory.ok_or_else(|| ProviderError::Unknown {
            provider: config.provider.clone(),
            known: self.providers(),
        })?;

        factory(config).map_err(|source| ProviderError::Build {
            provider: config.provider.clone(),
            source,
        })
    }

    /// Whether a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}
