use std::{collections::HashMap, time::Duration};

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{collect::FallbackMode, registry::RegistryCredentials};

use super::{
    DEFAULT_CACHE_TTL, DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_MAX_CONCURRENCY, DEFAULT_RETRY_COUNT,
    DEFAULT_RETRY_DELAY,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options recognized by the collection engine.
///
/// Manifests are always parsed in v1; `include_manifests` exists so callers that toggle it
/// keep working when partial-manifest collection lands.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
pub struct CollectionConfig {
    /// Whether manifests are parsed. Always true in v1.
    #[builder(default = true)]
    include_manifests: bool,

    /// Whether layer descriptors are retained in the output facts.
    #[builder(default = true)]
    include_layers: bool,

    /// Whether the config blob is fetched and embedded in the output facts.
    #[builder(default = true)]
    include_config: bool,

    /// Credentials installed on the registry client, keyed by registry host.
    #[builder(default)]
    credentials: HashMap<String, RegistryCredentials>,

    /// The per-HTTP-exchange deadline for the registry client.
    #[builder(default = DEFAULT_EXCHANGE_TIMEOUT)]
    timeout: Duration,

    /// The bound on in-flight registry requests. Reserved; v1 is sequential.
    #[builder(default = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// The maximum number of additional attempts for retryable errors.
    #[builder(default = DEFAULT_RETRY_COUNT)]
    retry_count: u32,

    /// The initial delay between retry attempts; doubles each attempt.
    #[builder(default = DEFAULT_RETRY_DELAY)]
    retry_delay: Duration,

    /// Whether the facts cache is consulted and populated.
    #[builder(default = true)]
    cache_enabled: bool,

    /// The time-to-live applied to facts cache entries.
    #[builder(default = DEFAULT_CACHE_TTL)]
    cache_ttl: Duration,

    /// The fallback behavior applied when a reference exhausts its retries.
    #[builder(default = FallbackMode::None)]
    fallback_mode: FallbackMode,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CollectionConfig::default();
        assert!(config.include_manifests);
        assert!(config.include_layers);
        assert!(config.include_config);
        assert!(config.cache_enabled);
        assert_eq!(*config.get_retry_count(), DEFAULT_RETRY_COUNT);
        assert_eq!(*config.get_timeout(), DEFAULT_EXCHANGE_TIMEOUT);
        assert_eq!(*config.get_fallback_mode(), FallbackMode::None);
    }

    #[test]
    fn test_config_builder_overrides() {
        let config = CollectionConfig::builder()
            .include_layers(false)
            .retry_count(1)
            .cache_ttl(Duration::from_millis(100))
            .fallback_mode(FallbackMode::BestEffort)
            .build();
        assert!(!config.include_layers);
        assert_eq!(*config.get_retry_count(), 1);
        assert_eq!(*config.get_cache_ttl(), Duration::from_millis(100));
        assert_eq!(*config.get_fallback_mode(), FallbackMode::BestEffort);
    }
}
