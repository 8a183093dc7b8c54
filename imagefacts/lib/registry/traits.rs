use async_trait::async_trait;

use crate::{facts::ImageFacts, reference::ImageReference, ImageFactsResult};

use super::{ManifestInfo, RegistryCredentials};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The registry-access capability the engine is constructed with.
///
/// The production implementation speaks the OCI distribution and Docker v2 HTTP APIs; tests
/// substitute canned implementations. Implementations are chosen at construction, never
/// discovered reflectively.
#[async_trait]
pub trait RegistryAccess: Send + Sync {
    /// Resolves a reference to a complete facts record: manifest, config blob, layers,
    /// platform, and derived labels.
    async fn get_image_facts(&self, reference: &ImageReference) -> ImageFactsResult<ImageFacts>;

    /// Resolves a reference to its manifest digest via a manifest HEAD request.
    ///
    /// Fails with a manifest error when the response carries neither a `Docker-Content-Digest`
    /// nor a `Content-Digest` header.
    async fn resolve_digest(&self, reference: &ImageReference) -> ImageFactsResult<String>;

    /// Fetches and parses the manifest for a reference, following multi-platform indexes down
    /// to a single-platform manifest.
    async fn parse_manifest(&self, reference: &ImageReference) -> ImageFactsResult<ManifestInfo>;

    /// Installs credentials for a registry host and resolves a usable authorization header.
    ///
    /// Passing `None` fails with an authentication error.
    async fn authenticate(
        &self,
        registry: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> ImageFactsResult<()>;

    /// Reports whether the implementation knows how to talk to the given registry host.
    fn supports_registry(&self, host: &str) -> bool;
}
