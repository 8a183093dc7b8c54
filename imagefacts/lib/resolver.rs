//! Tag-to-digest resolution with TTL caching.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    collect::FactsCache,
    config::DEFAULT_CACHE_TTL,
    facts::{ImageFacts, PlatformInfo},
    reference::ImageReference,
    registry::{ManifestList, RegistryAccess},
    ImageFactsError, ImageFactsResult,
};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The digest-resolution capability the engine is constructed with.
#[async_trait]
pub trait DigestResolution: Send + Sync {
    /// Resolves a reference's tag to a manifest digest.
    ///
    /// A reference that already pins a digest is returned without I/O; otherwise the cache is
    /// consulted before the registry.
    async fn resolve_tag_to_digest(&self, reference: &ImageReference)
        -> ImageFactsResult<String>;

    /// Resolves a digest for a specific platform.
    ///
    /// Equivalent to [`DigestResolution::resolve_tag_to_digest`] until multi-platform support
    /// lands.
    async fn resolve_platform_digest(
        &self,
        reference: &ImageReference,
        architecture: &str,
        os: &str,
    ) -> ImageFactsResult<String>;

    /// Fetches the multi-platform manifest list for a reference.
    ///
    /// Declared for forward compatibility; fails with manifest-not-found until multi-platform
    /// support lands.
    async fn get_manifest_list(
        &self,
        reference: &ImageReference,
    ) -> ImageFactsResult<ManifestList>;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Resolves tags to digests through a registry-access capability, caching results with a TTL.
pub struct DigestResolver {
    /// The registry-access capability used on cache misses.
    registry: Arc<dyn RegistryAccess>,

    /// Digest-only stub facts, keyed by the original reference string.
    cache: FactsCache,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DigestResolver {
    /// Creates a resolver with the default cache TTL.
    pub fn new(registry: Arc<dyn RegistryAccess>) -> Self {
        Self::with_ttl(registry, DEFAULT_CACHE_TTL)
    }

    /// Creates a resolver with an explicit cache TTL.
    pub fn with_ttl(registry: Arc<dyn RegistryAccess>, ttl: Duration) -> Self {
        Self {
            registry,
            cache: FactsCache::new(ttl),
        }
    }

    /// Drops expired digest cache entries, returning how many were removed.
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl DigestResolution for DigestResolver {
    async fn resolve_tag_to_digest(
        &self,
        reference: &ImageReference,
    ) -> ImageFactsResult<String> {
        // A digest-pinned reference short-circuits: no cache, no I/O.
        if let Some(digest) = reference.get_digest() {
            return Ok(digest.clone());
        }

        if let Some(cached) = self.cache.get(reference.get_original()) {
            if let Some(digest) = cached.digest.filter(|digest| !digest.is_empty()) {
                return Ok(digest);
            }
        }

        let digest = self.registry.resolve_digest(reference).await?;
        self.cache
            .insert(reference.get_original().clone(), digest_stub(reference, &digest));

        Ok(digest)
    }

    async fn resolve_platform_digest(
        &self,
        reference: &ImageReference,
        _architecture: &str,
        _os: &str,
    ) -> ImageFactsResult<String> {
        // v1 collapses to single-platform resolution.
        self.resolve_tag_to_digest(reference).await
    }

    async fn get_manifest_list(
        &self,
        reference: &ImageReference,
    ) -> ImageFactsResult<ManifestList> {
        Err(ImageFactsError::ManifestNotFound {
            reference: reference.canonical(),
            message: "manifest list resolution is not supported yet".to_string(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// A digest-only stub facts record, enough for the cache to serve later resolutions.
fn digest_stub(reference: &ImageReference, digest: &str) -> ImageFacts {
    ImageFacts {
        repository: reference.get_repository().clone(),
        tag: reference.get_tag().clone(),
        digest: Some(digest.to_string()),
        registry: reference.get_registry().clone(),
        size: 0,
        created: Utc::now(),
        labels: Default::default(),
        platform: PlatformInfo::default(),
        layers: Vec::new(),
        config: None,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
