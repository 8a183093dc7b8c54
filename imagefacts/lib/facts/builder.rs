use std::collections::HashMap;

use chrono::{DateTime, Utc};
use oci_spec::image::ImageConfiguration;
use serde_json::Value;

use crate::{
    reference::{dedupe_references, ImageReference},
    registry::{ManifestInfo, RegistryAccess},
};

use super::{ImageConfigInfo, ImageFacts, LayerInfo, PlatformInfo};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment entries with this prefix are promoted to labels, key lowercased and `_` mapped
/// to `.`.
const ENV_LABEL_PREFIX: &str = "LABEL_";

/// Common environment names promoted directly to labels.
const RECOGNIZED_ENV_LABELS: &[(&str, &str)] = &[
    ("VERSION", "version"),
    ("BUILD", "build"),
    ("COMMIT", "commit"),
    ("BRANCH", "branch"),
    ("MAINTAINER", "maintainer"),
    ("DESCRIPTION", "description"),
    ("VENDOR", "vendor"),
    ("LICENSE", "license"),
];

/// Environment names carrying an image creation timestamp, in precedence order.
const CREATED_ENV_KEYS: &[&str] = &["BUILD_DATE", "IMAGE_CREATED"];

/// Environment names promoted to `build.*` labels by [`FactsBuilder::extract_build_info`].
const BUILD_INFO_ENV_LABELS: &[(&str, &str)] = &[
    ("BUILD_DATE", "build.date"),
    ("BUILD_VERSION", "build.version"),
    ("GIT_COMMIT", "build.commit"),
    ("VCS_REF", "build.vcs.ref"),
    ("VCS_URL", "build.vcs.url"),
];

/// The pod spec keys holding container sequences, in extraction order.
const POD_CONTAINER_KEYS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Composes [`ImageFacts`] records from parsed references, manifests, and config blobs.
///
/// Stateless; the facts-building capability the engine is constructed with.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactsBuilder;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The facts-building capability.
pub trait FactsBuilding: Send + Sync {
    /// Composes an [`ImageFacts`] record from a parsed reference, its manifest, and
    /// (optionally) its config blob.
    fn build_facts(
        &self,
        reference: &ImageReference,
        manifest: &ManifestInfo,
        config: Option<&ImageConfiguration>,
    ) -> ImageFacts;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FactsBuilder {
    /// Creates a new facts builder.
    pub fn new() -> Self {
        Self
    }

    /// Collects facts for every image named by a pod spec.
    ///
    /// Images are read from the `containers`, `initContainers`, and `ephemeralContainers`
    /// sequences, deduplicated with first-occurrence order preserved, and resolved through the
    /// given registry access one reference at a time. Failures land in the error map keyed by
    /// the original image string.
    pub async fn build_facts_from_pod_images(
        &self,
        registry: &dyn RegistryAccess,
        pod_spec: &Value,
    ) -> (HashMap<String, ImageFacts>, HashMap<String, String>) {
        let mut facts = HashMap::new();
        let mut errors = HashMap::new();

        for image in dedupe_references(&extract_pod_images(pod_spec)) {
            let parsed = match image.parse::<ImageReference>() {
                Ok(parsed) => parsed,
                Err(err) => {
                    errors.insert(image, err.to_string());
                    continue;
                }
            };

            match registry.get_image_facts(&parsed).await {
                Ok(image_facts) => {
                    facts.insert(image, image_facts);
                }
                Err(err) => {
                    errors.insert(image, err.to_string());
                }
            }
        }

        (facts, errors)
    }

    /// Copies build provenance out of the config environment into `build.*` labels.
    ///
    /// Pure label derivation; performs no network I/O.
    pub fn extract_build_info(&self, facts: &mut ImageFacts) {
        let Some(config) = &facts.config else {
            return;
        };

        let mut additions = Vec::new();
        for entry in &config.env {
            let Some((key, value)) = entry.split_once('=') else {
                continue;
            };
            if let Some((_, label)) = BUILD_INFO_ENV_LABELS.iter().find(|(env, _)| *env == key) {
                additions.push((label.to_string(), value.to_string()));
            }
        }

        for (key, value) in additions {
            facts.labels.entry(key).or_insert(value);
        }
    }

    /// Mirrors pre-existing security-scan labels under the `security.scan.` prefix.
    ///
    /// Pure label derivation; performs no network I/O and never invents scan results.
    pub fn extract_vulnerability_info(&self, facts: &mut ImageFacts) {
        let mirrored: Vec<(String, String)> = facts
            .labels
            .iter()
            .filter(|(key, _)| {
                !key.starts_with("security.scan.")
                    && (key.contains("vulnerability")
                        || key.contains("cve")
                        || key.starts_with("security."))
            })
            .map(|(key, value)| (format!("security.scan.{}", key), value.clone()))
            .collect();

        for (key, value) in mirrored {
            facts.labels.entry(key).or_insert(value);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FactsBuilding for FactsBuilder {
    fn build_facts(
        &self,
        reference: &ImageReference,
        manifest: &ManifestInfo,
        config: Option<&ImageConfiguration>,
    ) -> ImageFacts {
        let digest = manifest
            .config_digest()
            .or_else(|| manifest.get_digest().clone());

        let layers: Vec<LayerInfo> = manifest
            .get_layers()
            .iter()
            .map(LayerInfo::from_descriptor)
            .collect();

        // Size is seeded from the config descriptor and then summed over the layers: the total
        // bytes the manifest describes, not the bytes on the wire.
        let mut size = manifest
            .get_config()
            .as_ref()
            .map(|desc| desc.size() as i64)
            .unwrap_or(0);
        size += layers.iter().map(|layer| layer.size).sum::<i64>();

        let platform = manifest
            .get_platform()
            .as_ref()
            .map(PlatformInfo::from_oci)
            .or_else(|| {
                config.map(|configuration| PlatformInfo {
                    architecture: configuration.architecture().to_string(),
                    os: configuration.os().to_string(),
                    variant: None,
                })
            })
            .unwrap_or_default();

        let env = config
            .and_then(|configuration| configuration.config().as_ref())
            .and_then(|runtime| runtime.env().as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let base_labels = config
            .and_then(|configuration| configuration.config().as_ref())
            .and_then(|runtime| runtime.labels().as_ref())
            .cloned()
            .unwrap_or_default();

        let labels = derive_labels(
            base_labels,
            env,
            digest.as_deref(),
            reference.get_registry(),
            size,
            layers.len(),
        );

        ImageFacts {
            repository: reference.get_repository().clone(),
            tag: reference.get_tag().clone(),
            digest,
            registry: reference.get_registry().clone(),
            size,
            created: extract_created(env),
            labels,
            platform,
            layers,
            config: config.map(ImageConfigInfo::from_oci),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Extracts image strings from a pod spec, in container-sequence order.
pub fn extract_pod_images(pod_spec: &Value) -> Vec<String> {
    let mut images = Vec::new();

    for key in POD_CONTAINER_KEYS {
        let Some(containers) = pod_spec.get(key).and_then(Value::as_array) else {
            continue;
        };
        for container in containers {
            if let Some(image) = container.get("image").and_then(Value::as_str) {
                images.push(image.to_string());
            }
        }
    }

    images
}

/// Reads the image creation time from `BUILD_DATE` or `IMAGE_CREATED` environment entries,
/// falling back to the current wall clock when neither parses as RFC 3339.
fn extract_created(env: &[String]) -> DateTime<Utc> {
    for key in CREATED_ENV_KEYS {
        for entry in env {
            let Some((name, value)) = entry.split_once('=') else {
                continue;
            };
            if name == *key {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
                    return parsed.with_timezone(&Utc);
                }
            }
        }
    }

    Utc::now()
}

/// Derives the label map for a facts record.
fn derive_labels(
    base_labels: HashMap<String, String>,
    env: &[String],
    digest: Option<&str>,
    registry: &str,
    size: i64,
    layer_count: usize,
) -> HashMap<String, String> {
    let mut labels = base_labels;

    for entry in env {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };

        if let Some(stripped) = key.strip_prefix(ENV_LABEL_PREFIX) {
            let normalized = stripped.to_lowercase().replace('_', ".");
            labels.insert(normalized, value.to_string());
        } else if let Some((_, label)) = RECOGNIZED_ENV_LABELS.iter().find(|(env, _)| *env == key)
        {
            labels.insert(label.to_string(), value.to_string());
        }
    }

    if let Some(digest) = digest {
        labels.insert("image.digest".to_string(), digest.to_string());
    }
    labels.insert("image.registry".to_string(), registry.to_string());
    labels.insert("image.size".to_string(), size.to_string());
    labels.insert("image.layers".to_string(), layer_count.to_string());

    labels
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
