//! Provider selection configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which broker provider to build, plus provider-specific options.
///
/// ```toml
/// provider = "memory"
///
/// [options]
/// concurrency = "4"
/// max_deliveries = "5"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub provider: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl BusConfig {
    /// Config for `provider` with no options.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            options: HashMap::new(),
        }
    }

    /// Add an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse from TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Look up an option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}
