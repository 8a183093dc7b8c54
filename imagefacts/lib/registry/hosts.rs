use std::sync::LazyLock;

use regex::Regex;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Registry hosts the client recognizes out of the box.
pub const KNOWN_REGISTRY_HOSTS: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
    "gcr.io",
    "us.gcr.io",
    "eu.gcr.io",
    "asia.gcr.io",
    "quay.io",
    "ghcr.io",
    "registry.k8s.io",
    "k8s.gcr.io",
];

/// Matches AWS Elastic Container Registry hosts.
static ECR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+\.dkr\.ecr\.[a-z0-9-]+\.amazonaws\.com$").unwrap());

/// Matches Azure Container Registry hosts.
static ACR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+\.azurecr\.io$").unwrap());

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The family a registry host belongs to, used by best-effort fallback labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// Docker Hub and its aliases.
    DockerHub,

    /// Google Container Registry.
    Gcr,

    /// Quay.
    Quay,

    /// GitHub Container Registry.
    Ghcr,

    /// AWS Elastic Container Registry.
    Ecr,

    /// Azure Container Registry.
    Acr,

    /// A Harbor installation, recognized by name.
    Harbor,

    /// Anything else.
    Custom,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryKind {
    /// The label value identifying the registry type.
    pub fn label_type(&self) -> &'static str {
        match self {
            RegistryKind::DockerHub => "docker-hub",
            RegistryKind::Gcr => "gcr",
            RegistryKind::Quay => "quay",
            RegistryKind::Ghcr => "ghcr",
            RegistryKind::Ecr => "ecr",
            RegistryKind::Acr => "acr",
            RegistryKind::Harbor => "harbor",
            RegistryKind::Custom => "custom",
        }
    }

    /// The provider behind the registry, when one is well known.
    pub fn provider(&self) -> Option<&'static str> {
        match self {
            RegistryKind::DockerHub => Some("docker"),
            RegistryKind::Gcr => Some("google"),
            RegistryKind::Quay => Some("redhat"),
            RegistryKind::Ghcr => Some("github"),
            RegistryKind::Ecr => Some("aws"),
            RegistryKind::Acr => Some("azure"),
            RegistryKind::Harbor | RegistryKind::Custom => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns true when the host is Docker Hub or one of its aliases.
pub fn is_docker_hub(host: &str) -> bool {
    matches!(
        host,
        "docker.io" | "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com"
    )
}

/// Reports whether the client knows how to talk to the given registry host.
///
/// Known hosts and ECR/ACR-shaped hosts are recognized explicitly; everything else is accepted
/// permissively so unknown registries are still attempted.
pub fn supports_registry(host: &str) -> bool {
    if KNOWN_REGISTRY_HOSTS.contains(&host) || ECR_REGEX.is_match(host) || ACR_REGEX.is_match(host)
    {
        return true;
    }

    tracing::debug!("unknown registry host {}, attempting anyway", host);
    true
}

/// Classifies a registry host into a [`RegistryKind`].
pub fn classify_registry(host: &str) -> RegistryKind {
    if is_docker_hub(host) {
        RegistryKind::DockerHub
    } else if host == "gcr.io" || host.ends_with(".gcr.io") {
        RegistryKind::Gcr
    } else if host == "quay.io" {
        RegistryKind::Quay
    } else if host == "ghcr.io" {
        RegistryKind::Ghcr
    } else if ECR_REGEX.is_match(host) {
        RegistryKind::Ecr
    } else if ACR_REGEX.is_match(host) {
        RegistryKind::Acr
    } else if host.contains("harbor") {
        RegistryKind::Harbor
    } else {
        RegistryKind::Custom
    }
}

/// Returns the base URL for the registry's distribution API.
///
/// Docker Hub aliases are rewritten to the canonical `registry-1.docker.io` endpoint the Hub
/// actually serves the v2 API from.
pub fn registry_base_url(host: &str) -> String {
    if is_docker_hub(host) {
        "https://registry-1.docker.io".to_string()
    } else {
        format!("https://{}", host)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
