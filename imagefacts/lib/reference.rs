//! Image reference parsing, canonical normalization, and deduplication.

use std::{
    collections::HashSet,
    fmt::{self, Display},
    str::FromStr,
    sync::LazyLock,
};

use getset::Getters;
use regex::Regex;

use crate::ImageFactsError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The canonical Docker Hub registry host used when a reference omits the registry.
pub const DOCKER_HUB_REGISTRY: &str = "index.docker.io";

/// The repository namespace prepended to single-segment Docker Hub repositories.
pub const DEFAULT_REPOSITORY_NAMESPACE: &str = "library";

/// The tag used when a reference omits one.
pub const DEFAULT_TAG: &str = "latest";

/// Regular expression for validating image tags: 1 to 128 characters from `[A-Za-z0-9._-]`.
static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,128}$").unwrap());

/// Regular expression for validating image digests.
pub(crate) static DIGEST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sha256:[0-9a-f]{64}$").unwrap());

/// Regular expression for validating registry hosts, optionally with a port.
static REGISTRY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9.-]+(:[0-9]+)?$").unwrap());

/// Regular expression for validating repository paths.
static REPOSITORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+(?:[._-][a-z0-9]+)*)(/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$").unwrap()
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The parsed view of a container image reference string.
///
/// One of `tag` or `digest` is always set; `tag` defaults to `latest` when the input carries
/// neither. The verbatim input is preserved in `original` so batch results can be keyed by the
/// strings the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ImageReference {
    /// The registry host, optionally with a port.
    registry: String,

    /// The repository path within the registry.
    repository: String,

    /// The image tag.
    tag: String,

    /// The image digest, when the input carried one.
    digest: Option<String>,

    /// The verbatim input string.
    original: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageReference {
    /// Returns the canonical form of the reference.
    ///
    /// The digest, when present, replaces the tag: `<registry>/<repository>@<digest>`,
    /// otherwise `<registry>/<repository>:<tag>`.
    pub fn canonical(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}/{}@{}", self.registry, self.repository, digest),
            None => format!("{}/{}:{}", self.registry, self.repository, self.tag),
        }
    }

    /// Returns true when the reference pins a digest.
    pub fn is_digest_reference(&self) -> bool {
        self.digest.is_some()
    }

    /// Returns the selector used on manifest endpoints: the digest when pinned, else the tag.
    pub fn manifest_selector(&self) -> &str {
        match &self.digest {
            Some(digest) => digest,
            None => &self.tag,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ImageReference {
    type Err = ImageFactsError;

    /// Parses a string into an [`ImageReference`].
    ///
    /// Supported formats include:
    /// - "registry/repository:tag"
    /// - "repository:tag"
    /// - "repository"
    /// - "registry/repository@digest"
    /// - "registry/repository:tag@digest"
    ///
    /// If the registry is omitted, it defaults to [`DOCKER_HUB_REGISTRY`]; single-segment
    /// repositories are namespaced under [`DEFAULT_REPOSITORY_NAMESPACE`]. If the tag is
    /// omitted, it defaults to [`DEFAULT_TAG`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ImageFactsError::ImageReferenceError(
                "input string is empty".into(),
            ));
        }

        if s.chars().any(char::is_whitespace) {
            return Err(ImageFactsError::ImageReferenceError(format!(
                "reference contains whitespace: {}",
                s
            )));
        }

        if s.starts_with('-') || s.ends_with('-') {
            return Err(ImageFactsError::ImageReferenceError(format!(
                "reference has a leading or trailing '-': {}",
                s
            )));
        }

        let (rest, digest) = if s.contains("@sha256:") {
            let (pre, digest_part) = s
                .split_once('@')
                .expect("reference contains '@' by construction");
            if !DIGEST_REGEX.is_match(digest_part) {
                return Err(ImageFactsError::ImageReferenceError(format!(
                    "invalid digest: {}",
                    digest_part
                )));
            }
            (pre, Some(digest_part.to_string()))
        } else {
            (s, None)
        };

        // The last ':' separates repository and tag unless the candidate tag contains '/',
        // in which case the colon belongs to a registry port.
        let (path, tag) = if rest.contains(':') && !rest.contains("://") {
            let (repo_part, tag_part) = rest
                .rsplit_once(':')
                .expect("reference contains ':' by construction");
            if tag_part.contains('/') {
                (rest, None)
            } else {
                if !TAG_REGEX.is_match(tag_part) {
                    return Err(ImageFactsError::ImageReferenceError(format!(
                        "invalid tag: {}",
                        tag_part
                    )));
                }
                (repo_part, Some(tag_part.to_string()))
            }
        } else {
            (rest, None)
        };

        let (registry, repository) = match path.split_once('/') {
            None => (
                DOCKER_HUB_REGISTRY.to_string(),
                format!("{}/{}", DEFAULT_REPOSITORY_NAMESPACE, path),
            ),
            Some((first, remainder)) => {
                if first.contains('.') || first.contains(':') || first == "localhost" {
                    (first.to_string(), remainder.to_string())
                } else {
                    (DOCKER_HUB_REGISTRY.to_string(), path.to_string())
                }
            }
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(ImageFactsError::ImageReferenceError(
                "repository is empty".into(),
            ));
        }

        if !REGISTRY_REGEX.is_match(&registry) {
            return Err(ImageFactsError::ImageReferenceError(format!(
                "invalid registry: {}",
                registry
            )));
        }

        if !REPOSITORY_REGEX.is_match(&repository) {
            return Err(ImageFactsError::ImageReferenceError(format!(
                "invalid repository: {}",
                repository
            )));
        }

        Ok(ImageReference {
            registry,
            repository,
            tag: tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            digest,
            original: s.to_string(),
        })
    }
}

impl Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Deduplicates image reference strings by canonical form, preserving first-occurrence order.
///
/// References that fail to normalize are keyed (and preserved) by their original string so a
/// malformed input still reaches the collector and is reported there.
pub fn dedupe_references(references: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();

    for reference in references {
        let key = reference
            .parse::<ImageReference>()
            .map(|parsed| parsed.canonical())
            .unwrap_or_else(|_| reference.clone());

        if seen.insert(key) {
            deduped.push(reference.clone());
        }
    }

    deduped
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
