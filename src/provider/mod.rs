//! Pluggable backend selection.
//!
//! A composition root builds one [`ProviderRegistry`], registers the
//! adapters it links against, and passes it wherever buses are created:
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! registry.register("nsq", nsq_adapter::factory)?;
//! let bus = registry.create(&BusConfig::from_toml_str(&raw)?)?;
//! ```

mod config;
mod registry;

pub use config::BusConfig;
pub use registry::{ProviderError, ProviderFactory, ProviderRegistry};

/// Name of the built-in in-memory provider.
pub const MEMORY_PROVIDER: &str = "memory";
