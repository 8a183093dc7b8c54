use getset::Getters;
use oci_spec::image::{Arch, Descriptor, ImageIndex, ImageManifest, Os, Platform};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The MIME type for Docker Registry v2 manifests.
pub const DOCKER_MANIFEST_MIME_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// The MIME type for OCI v1 image manifests.
pub const OCI_MANIFEST_MIME_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// The MIME type for Docker Registry v2 manifest lists.
pub const DOCKER_MANIFEST_LIST_MIME_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// The MIME type for OCI v1 image indexes.
pub const OCI_INDEX_MIME_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// The MIME type for Docker Registry v2 configuration blobs.
pub const DOCKER_CONFIG_MIME_TYPE: &str = "application/vnd.docker.container.image.v1+json";

/// The annotation key used to identify attestation manifests in an image index.
pub const REFERENCE_TYPE_ANNOTATION: &str = "vnd.docker.reference.type";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The resolved wire view of a single-platform manifest.
///
/// Transient: lives only long enough for the facts builder to compose an `ImageFacts` record.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ManifestInfo {
    /// The media type the registry served the manifest as.
    media_type: String,

    /// The manifest digest reported by the registry, when a digest header was present.
    digest: Option<String>,

    /// The config blob descriptor.
    config: Option<Descriptor>,

    /// The layer descriptors, in manifest order.
    layers: Vec<Descriptor>,

    /// The platform the manifest was selected for, when it came out of an index.
    platform: Option<Platform>,
}

/// The wire view of a multi-platform manifest list or image index.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ManifestList {
    /// The media type the registry served the index as.
    media_type: String,

    /// The parsed index.
    index: ImageIndex,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ManifestInfo {
    /// Builds a `ManifestInfo` from a parsed image manifest.
    pub fn from_image_manifest(
        media_type: impl Into<String>,
        digest: Option<String>,
        manifest: &ImageManifest,
        platform: Option<Platform>,
    ) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            config: Some(manifest.config().clone()),
            layers: manifest.layers().clone(),
            platform,
        }
    }

    /// Returns the digest of the config blob descriptor, when one is present.
    pub fn config_digest(&self) -> Option<String> {
        self.config.as_ref().map(|desc| desc.digest().to_string())
    }
}

impl ManifestList {
    /// Builds a `ManifestList` from a parsed image index.
    pub fn new(media_type: impl Into<String>, index: ImageIndex) -> Self {
        Self {
            media_type: media_type.into(),
            index,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reports whether a manifest Content-Type denotes a multi-platform list or index.
pub fn is_index_media_type(media_type: &str) -> bool {
    media_type.contains("manifest.list") || media_type.contains("image.index")
}

/// Selects the manifest descriptor to follow out of a multi-platform index.
///
/// linux/amd64 is preferred, then any linux manifest; attestation manifests are skipped. Falls
/// back to the first descriptor so single-entry indexes without platform data still resolve.
pub fn select_platform_manifest(index: &ImageIndex) -> Option<&Descriptor> {
    let is_attestation = |desc: &Descriptor| {
        desc.annotations()
            .as_ref()
            .is_some_and(|annotations| annotations.contains_key(REFERENCE_TYPE_ANNOTATION))
    };

    index
        .manifests()
        .iter()
        .find(|desc| {
            desc.platform().as_ref().is_some_and(|platform| {
                matches!(platform.os(), Os::Linux)
                    && matches!(platform.architecture(), Arch::Amd64)
            }) && !is_attestation(desc)
        })
        .or_else(|| {
            index.manifests().iter().find(|desc| {
                desc.platform()
                    .as_ref()
                    .is_some_and(|platform| matches!(platform.os(), Os::Linux))
                    && !is_attestation(desc)
            })
        })
        .or_else(|| index.manifests().iter().find(|desc| !is_attestation(desc)))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_BODY: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
        "manifests": [
            {
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "digest": "sha256:1111111111111111111111111111111111111111111111111111111111111111",
                "size": 428,
                "platform": {"architecture": "arm64", "os": "linux"}
            },
            {
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "digest": "sha256:2222222222222222222222222222222222222222222222222222222222222222",
                "size": 428,
                "platform": {"architecture": "amd64", "os": "linux"}
            }
        ]
    }"#;

    #[test]
    fn test_manifest_index_media_type_detection() {
        assert!(is_index_media_type(DOCKER_MANIFEST_LIST_MIME_TYPE));
        assert!(is_index_media_type(OCI_INDEX_MIME_TYPE));
        assert!(!is_index_media_type(DOCKER_MANIFEST_MIME_TYPE));
        assert!(!is_index_media_type(OCI_MANIFEST_MIME_TYPE));
    }

    #[test]
    fn test_manifest_select_prefers_linux_amd64() {
        let index: ImageIndex = serde_json::from_str(INDEX_BODY).unwrap();
        let selected = select_platform_manifest(&index).unwrap();
        assert!(selected.digest().to_string().starts_with("sha256:2222"));
    }

    #[test]
    fn test_manifest_select_empty_index() {
        let index: ImageIndex =
            serde_json::from_str(r#"{"schemaVersion": 2, "manifests": []}"#).unwrap();
        assert!(select_platform_manifest(&index).is_none());
    }
}
