use std::collections::HashMap;

use chrono::{DateTime, Utc};
use oci_spec::image::{Descriptor, ImageConfiguration, Platform};
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The canonical metadata record for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFacts {
    /// The repository path within the registry.
    pub repository: String,

    /// The image tag.
    pub tag: String,

    /// The image digest, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub digest: Option<String>,

    /// The registry host the image was resolved against.
    pub registry: String,

    /// The total bytes described by the manifest: config blob plus all layers.
    pub size: i64,

    /// When the image was created.
    pub created: DateTime<Utc>,

    /// Labels derived from the image configuration plus engine-derived `image.*` entries.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,

    /// The platform the facts describe.
    pub platform: PlatformInfo,

    /// The layer inventory, in manifest order.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub layers: Vec<LayerInfo>,

    /// Selected fields of the image's runtime configuration, when the config blob was fetched.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub config: Option<ImageConfigInfo>,
}

/// One layer of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    /// The layer digest.
    pub digest: String,

    /// The layer size in bytes.
    pub size: i64,

    /// The layer media type.
    pub media_type: String,

    /// Alternate URLs the layer may be fetched from.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub urls: Option<Vec<String>>,

    /// Annotations attached to the layer descriptor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub annotations: Option<HashMap<String, String>>,
}

/// The platform an image was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    /// The CPU architecture.
    pub architecture: String,

    /// The operating system.
    pub os: String,

    /// The architecture variant, when one applies.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub variant: Option<String>,
}

/// Selected fields of an image's runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfigInfo {
    /// The set of exposed ports.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub exposed_ports: Vec<String>,

    /// Environment entries, `KEY=value` shaped.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,

    /// The entrypoint sequence.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entrypoint: Vec<String>,

    /// The command sequence.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cmd: Vec<String>,

    /// The working directory.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub working_dir: String,

    /// The user the image runs as.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub user: String,

    /// The set of declared volumes.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub volumes: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerInfo {
    /// Builds a `LayerInfo` from an OCI layer descriptor.
    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        Self {
            digest: descriptor.digest().to_string(),
            size: descriptor.size() as i64,
            media_type: descriptor.media_type().to_string(),
            urls: descriptor.urls().clone(),
            annotations: descriptor.annotations().clone(),
        }
    }
}

impl PlatformInfo {
    /// Builds a `PlatformInfo` from an OCI platform record.
    pub fn from_oci(platform: &Platform) -> Self {
        Self {
            architecture: platform.architecture().to_string(),
            os: platform.os().to_string(),
            variant: platform.variant().clone(),
        }
    }

    /// The platform recorded when nothing better is known.
    pub fn unknown() -> Self {
        Self {
            architecture: "unknown".to_string(),
            os: "unknown".to_string(),
            variant: None,
        }
    }

    /// Renders the `<os>/<arch>` key used in summary aggregation.
    pub fn summary_key(&self) -> String {
        format!("{}/{}", self.os, self.architecture)
    }
}

impl ImageConfigInfo {
    /// Builds an `ImageConfigInfo` from an OCI image configuration.
    pub fn from_oci(configuration: &ImageConfiguration) -> Self {
        let Some(config) = configuration.config() else {
            return Self::default();
        };

        Self {
            exposed_ports: config.exposed_ports().clone().unwrap_or_default(),
            env: config.env().clone().unwrap_or_default(),
            entrypoint: config.entrypoint().clone().unwrap_or_default(),
            cmd: config.cmd().clone().unwrap_or_default(),
            working_dir: config.working_dir().clone().unwrap_or_default(),
            user: config.user().clone().unwrap_or_default(),
            volumes: config.volumes().clone().unwrap_or_default(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for PlatformInfo {
    /// Platform facts default to linux/amd64 until a manifest or config says otherwise.
    fn default() -> Self {
        Self {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            variant: None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_platform_defaults_and_keys() {
        let platform = PlatformInfo::default();
        assert_eq!(platform.architecture, "amd64");
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.summary_key(), "linux/amd64");

        let unknown = PlatformInfo::unknown();
        assert_eq!(unknown.summary_key(), "unknown/unknown");
    }

    #[test]
    fn test_types_config_info_from_oci() {
        let configuration: ImageConfiguration = serde_json::from_str(
            r#"{
                "architecture": "amd64",
                "os": "linux",
                "config": {
                    "User": "nginx",
                    "Env": ["PATH=/usr/local/sbin", "NGINX_VERSION=1.27.0"],
                    "Entrypoint": ["/docker-entrypoint.sh"],
                    "Cmd": ["nginx", "-g", "daemon off;"],
                    "WorkingDir": "/",
                    "ExposedPorts": {"80/tcp": {}}
                },
                "rootfs": {"type": "layers", "diff_ids": []},
                "history": []
            }"#,
        )
        .unwrap();

        let info = ImageConfigInfo::from_oci(&configuration);
        assert_eq!(info.user, "nginx");
        assert_eq!(info.env.len(), 2);
        assert_eq!(info.entrypoint, vec!["/docker-entrypoint.sh"]);
        assert_eq!(info.cmd, vec!["nginx", "-g", "daemon off;"]);
        assert_eq!(info.exposed_ports, vec!["80/tcp"]);
    }

    #[test]
    fn test_types_layer_info_from_descriptor() {
        let descriptor: Descriptor = serde_json::from_str(
            r#"{
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "digest": "sha256:3333333333333333333333333333333333333333333333333333333333333333",
                "size": 2811321
            }"#,
        )
        .unwrap();

        let layer = LayerInfo::from_descriptor(&descriptor);
        assert!(layer.digest.starts_with("sha256:3333"));
        assert_eq!(layer.size, 2811321);
        assert!(!layer.media_type.is_empty());
        assert!(layer.urls.is_none());
    }
}
