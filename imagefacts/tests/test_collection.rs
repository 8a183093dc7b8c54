//! End-to-end collection runs against a canned registry implementation.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use imagefacts::{
    collect::{CollectorEngine, ErrorKind, FallbackMode},
    config::CollectionConfig,
    facts::{ImageFacts, PlatformInfo},
    progress::NoopProgress,
    reference::ImageReference,
    registry::{ManifestInfo, RegistryAccess, RegistryCredentials},
    ImageFactsError, ImageFactsResult,
};
use tokio_util::sync::CancellationToken;

//--------------------------------------------------------------------------------------------------
// Types: Stub registry
//--------------------------------------------------------------------------------------------------

/// What the stub serves for one canonical reference.
#[derive(Debug, Clone)]
enum Outcome {
    Facts,
    NotFound,
    NetworkError,
    AuthError,
}

/// A canned registry keyed by canonical reference, counting every facts call.
#[derive(Debug, Default)]
struct StubRegistry {
    outcomes: HashMap<String, Outcome>,
    calls: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl StubRegistry {
    fn serving(references: &[&str]) -> Self {
        let mut outcomes = HashMap::new();
        for reference in references {
            let canonical = reference
                .parse::<ImageReference>()
                .unwrap()
                .canonical();
            outcomes.insert(canonical, Outcome::Facts);
        }
        Self {
            outcomes,
            ..Default::default()
        }
    }

    fn with_outcome(mut self, reference: &str, outcome: Outcome) -> Self {
        let canonical = reference.parse::<ImageReference>().unwrap().canonical();
        self.outcomes.insert(canonical, outcome);
        self
    }

    fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

fn stub_facts(reference: &ImageReference) -> ImageFacts {
    ImageFacts {
        repository: reference.get_repository().clone(),
        tag: reference.get_tag().clone(),
        digest: Some(format!("sha256:{}", "a".repeat(64))),
        registry: reference.get_registry().clone(),
        size: 1000,
        created: Utc::now(),
        labels: Default::default(),
        platform: PlatformInfo::default(),
        layers: Vec::new(),
        config: None,
    }
}

#[async_trait]
impl RegistryAccess for StubRegistry {
    async fn get_image_facts(&self, reference: &ImageReference) -> ImageFactsResult<ImageFacts> {
        let canonical = reference.canonical();
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(canonical.clone());

        match self.outcomes.get(&canonical) {
            Some(Outcome::Facts) => Ok(stub_facts(reference)),
            Some(Outcome::NetworkError) => Err(ImageFactsError::Network {
                operation: "manifest get".to_string(),
                message: "connection refused".to_string(),
            }),
            Some(Outcome::AuthError) => Err(ImageFactsError::AuthenticationFailed {
                registry: reference.get_registry().clone(),
                message: "status 401 unauthorized response from registry".to_string(),
            }),
            Some(Outcome::NotFound) | None => Err(ImageFactsError::ManifestNotFound {
                reference: canonical,
                message: "manifest not found (404)".to_string(),
            }),
        }
    }

    async fn resolve_digest(&self, _reference: &ImageReference) -> ImageFactsResult<String> {
        Ok(format!("sha256:{}", "a".repeat(64)))
    }

    async fn parse_manifest(&self, reference: &ImageReference) -> ImageFactsResult<ManifestInfo> {
        Err(ImageFactsError::ManifestNotFound {
            reference: reference.canonical(),
            message: "manifest not found (404)".to_string(),
        })
    }

    async fn authenticate(
        &self,
        _registry: &str,
        _credentials: Option<&RegistryCredentials>,
    ) -> ImageFactsResult<()> {
        Ok(())
    }

    fn supports_registry(&self, _host: &str) -> bool {
        true
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn engine(registry: Arc<StubRegistry>, config: CollectionConfig) -> CollectorEngine {
    CollectorEngine::with_components(registry, Arc::new(NoopProgress), config)
}

fn strings(references: &[&str]) -> Vec<String> {
    references.iter().map(|s| s.to_string()).collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_collection_all_successful_with_duplicates() {
    let registry = Arc::new(StubRegistry::serving(&[
        "nginx:latest",
        "busybox:latest",
        "postgres:13",
    ]));
    let engine = engine(registry.clone(), CollectionConfig::default());

    let references = strings(&["nginx:latest", "busybox:latest", "postgres:13", "postgres:13"]);
    let result = engine
        .collect_image_facts(&references, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.statistics.total_images, 3);
    assert_eq!(result.statistics.successful_images, 3);
    assert_eq!(result.statistics.failed_images, 0);
    assert!(result.errors.is_empty());
    assert_eq!(result.facts.len() + result.errors.len(), 3);
    assert_eq!(
        result.facts.get("nginx:latest").unwrap().repository,
        "library/nginx"
    );
    assert_eq!(result.statistics.registries_accessed, 1);
    assert_eq!(registry.calls(), 3);
}

#[test_log::test(tokio::test)]
async fn test_collection_canonical_equivalence_dedupes() {
    let registry = Arc::new(StubRegistry::serving(&["nginx:latest"]));
    let engine = engine(registry.clone(), CollectionConfig::default());

    let references = strings(&[
        "nginx",
        "nginx:latest",
        "index.docker.io/library/nginx:latest",
    ]);
    let result = engine
        .collect_image_facts(&references, &CancellationToken::new())
        .await
        .unwrap();

    // One canonical image survives deduplication, keyed by its first occurrence.
    assert_eq!(result.statistics.total_images, 1);
    assert!(result.facts.contains_key("nginx"));
    assert_eq!(registry.calls(), 1);
}

#[test_log::test(tokio::test)]
async fn test_collection_partial_failure_with_none_fallback() {
    let registry = Arc::new(
        StubRegistry::serving(&["nginx:latest"])
            .with_outcome("definitely-does-not-exist:nowhere", Outcome::NotFound),
    );
    let engine = engine(registry, CollectionConfig::default());

    let references = strings(&["nginx:latest", "definitely-does-not-exist:nowhere"]);
    let result = engine
        .collect_image_facts(&references, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.statistics.successful_images, 1);
    assert_eq!(result.statistics.failed_images, 1);
    assert_eq!(result.facts.len(), 1);
    assert!(result.facts.contains_key("nginx:latest"));

    let error = result.errors.get("definitely-does-not-exist:nowhere").unwrap();
    assert_eq!(error.kind, ErrorKind::Manifest);
    assert!(!error.retryable);
    assert_eq!(result.facts.len() + result.errors.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_collection_network_error_best_effort_fallback() {
    let registry = Arc::new(
        StubRegistry::default().with_outcome("nginx:latest", Outcome::NetworkError),
    );
    let config = CollectionConfig::builder()
        .retry_count(2)
        .retry_delay(Duration::from_millis(1))
        .fallback_mode(FallbackMode::BestEffort)
        .build();
    let engine = engine(registry.clone(), config);

    let result = engine
        .collect_image_facts(&strings(&["nginx:latest"]), &CancellationToken::new())
        .await
        .unwrap();

    // The initial attempt plus two retries, then fallback facts.
    assert_eq!(registry.calls(), 3);
    assert_eq!(result.statistics.successful_images, 1);
    assert_eq!(result.statistics.failed_images, 0);

    let facts = result.facts.get("nginx:latest").unwrap();
    assert_eq!(facts.platform, PlatformInfo::default());
    assert_eq!(
        facts.labels.get("collection.error").map(String::as_str),
        Some("network")
    );
    assert_eq!(
        facts.labels.get("collection.fallback").map(String::as_str),
        Some("best-effort")
    );
    assert_eq!(
        facts.labels.get("registry.type").map(String::as_str),
        Some("docker-hub")
    );
}

#[test_log::test(tokio::test)]
async fn test_collection_auth_error_best_effort_fallback_gcr() {
    let registry = Arc::new(
        StubRegistry::default().with_outcome("gcr.io/my-project/my-app:v1.0", Outcome::AuthError),
    );
    let config = CollectionConfig::builder()
        .fallback_mode(FallbackMode::BestEffort)
        .build();
    let engine = engine(registry.clone(), config);

    let result = engine
        .collect_image_facts(
            &strings(&["gcr.io/my-project/my-app:v1.0"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // Auth errors are surfaced immediately: no retries before the fallback.
    assert_eq!(registry.calls(), 1);

    let facts = result.facts.get("gcr.io/my-project/my-app:v1.0").unwrap();
    assert_eq!(facts.labels.get("registry.type").map(String::as_str), Some("gcr"));
    assert_eq!(
        facts.labels.get("registry.provider").map(String::as_str),
        Some("google")
    );
    assert_eq!(
        facts.labels.get("collection.error").map(String::as_str),
        Some("auth")
    );
}

#[test_log::test(tokio::test)]
async fn test_collection_cache_hits_within_ttl_and_expiry() {
    let registry = Arc::new(StubRegistry::serving(&["nginx:latest"]));
    let config = CollectionConfig::builder()
        .cache_ttl(Duration::from_millis(100))
        .build();
    let engine = engine(registry.clone(), config);
    let cancel = CancellationToken::new();
    let references = strings(&["nginx:latest"]);

    let first = engine.collect_image_facts(&references, &cancel).await.unwrap();
    assert_eq!(first.statistics.cache_misses, 1);
    assert_eq!(first.statistics.cache_hits, 0);

    let second = engine.collect_image_facts(&references, &cancel).await.unwrap();
    assert_eq!(second.statistics.cache_hits, 1);
    assert_eq!(second.statistics.cache_misses, 0);
    assert_eq!(registry.calls(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let third = engine.collect_image_facts(&references, &cancel).await.unwrap();
    assert_eq!(third.statistics.cache_misses, 1);
    assert_eq!(registry.calls(), 2);
}

#[test_log::test(tokio::test)]
async fn test_collection_cache_disabled_always_calls_registry() {
    let registry = Arc::new(StubRegistry::serving(&["nginx:latest"]));
    let config = CollectionConfig::builder().cache_enabled(false).build();
    let engine = engine(registry.clone(), config);
    let cancel = CancellationToken::new();
    let references = strings(&["nginx:latest"]);

    engine.collect_image_facts(&references, &cancel).await.unwrap();
    let result = engine.collect_image_facts(&references, &cancel).await.unwrap();

    assert_eq!(result.statistics.cache_hits, 0);
    assert_eq!(result.statistics.cache_misses, 0);
    assert_eq!(registry.calls(), 2);
}

#[test_log::test(tokio::test)]
async fn test_collection_malformed_reference_recorded_as_error() {
    let registry = Arc::new(StubRegistry::serving(&["nginx:latest"]));
    let engine = engine(registry, CollectionConfig::default());

    let references = strings(&["nginx:latest", "bad reference"]);
    let result = engine
        .collect_image_facts(&references, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.statistics.total_images, 2);
    assert_eq!(result.statistics.failed_images, 1);
    let error = result.errors.get("bad reference").unwrap();
    assert_eq!(error.kind, ErrorKind::Manifest);
}

#[test_log::test(tokio::test)]
async fn test_collection_cancellation_during_retry_wait() {
    let registry = Arc::new(
        StubRegistry::default().with_outcome("nginx:latest", Outcome::NetworkError),
    );
    let config = CollectionConfig::builder()
        .retry_count(5)
        .retry_delay(Duration::from_secs(30))
        .build();
    let engine = engine(registry, config);

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let references = strings(&["nginx:latest", "busybox:latest"]);
    let result = engine.collect_image_facts(&references, &cancel).await.unwrap();

    // The in-flight reference reports the wrapped original error; the rest are not processed.
    let error = result.errors.get("nginx:latest").unwrap();
    assert!(error.message.contains("cancelled during retry"));
    assert!(error.message.contains("connection refused"));
    assert!(!result.facts.contains_key("busybox:latest"));
    assert!(!result.errors.contains_key("busybox:latest"));
    assert!(result.duration < Duration::from_secs(10));
}

#[test_log::test(tokio::test)]
async fn test_collection_include_layers_disabled_strips_layers() {
    let registry = Arc::new(StubRegistry::serving(&["nginx:latest"]));
    let config = CollectionConfig::builder().include_layers(false).build();
    let engine = engine(registry, config);

    let result = engine
        .collect_image_facts(&strings(&["nginx:latest"]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.facts.get("nginx:latest").unwrap().layers.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_collection_statistics_identities() {
    let registry = Arc::new(
        StubRegistry::serving(&["nginx:latest", "redis:7"])
            .with_outcome("ghost:1", Outcome::NotFound),
    );
    let engine = engine(registry, CollectionConfig::default());

    let references = strings(&["nginx:latest", "redis:7", "ghost:1", "nginx:latest"]);
    let result = engine
        .collect_image_facts(&references, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.statistics.total_images, 3);
    assert_eq!(result.statistics.successful_images, result.facts.len());
    assert_eq!(result.statistics.failed_images, result.errors.len());
    assert_eq!(
        result.facts.len() + result.errors.len(),
        result.statistics.total_images
    );
}
