use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    config::CollectionConfig,
    facts::ImageFacts,
    progress::{LogProgress, ProgressReporter},
    reference::{dedupe_references, ImageReference},
    registry::{RegistryAccess, RegistryClient},
    ImageFactsError, ImageFactsResult,
};

use super::{CollectionError, ErrorCollector, ErrorHandler, FactsCache};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Counters describing one collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatistics {
    /// The number of unique references the run processed.
    pub total_images: usize,

    /// How many references produced facts, fallback facts included.
    pub successful_images: usize,

    /// How many references failed terminally.
    pub failed_images: usize,

    /// How many references were served from the facts cache.
    pub cache_hits: usize,

    /// How many references missed the facts cache.
    pub cache_misses: usize,

    /// How many distinct registries the recorded facts span.
    pub registries_accessed: usize,
}

/// The outcome of one collection run.
#[derive(Debug)]
pub struct ImageCollectionResult {
    /// Facts per reference, keyed by the caller's original string.
    pub facts: HashMap<String, ImageFacts>,

    /// Terminal errors per reference, keyed by the caller's original string.
    pub errors: HashMap<String, CollectionError>,

    /// Counters for the run.
    pub statistics: CollectionStatistics,

    /// How long the run took.
    pub duration: Duration,

    /// When the run started.
    pub timestamp: DateTime<Utc>,
}

/// The resilient batch collector: orchestrates per-reference collection with caching,
/// classified retries, and fallback facts.
///
/// Processing is strictly sequential in v1, which keeps cache mutations and counter updates
/// free of data races by construction. The cancellation token is consulted at every suspension
/// point.
pub struct CollectorEngine {
    /// The registry-access capability.
    registry: Arc<dyn RegistryAccess>,

    /// The retry and fallback policy.
    handler: ErrorHandler,

    /// The facts cache, keyed by original reference string.
    cache: FactsCache,

    /// The progress-reporting capability.
    progress: Arc<dyn ProgressReporter>,

    /// The run configuration.
    config: CollectionConfig,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CollectorEngine {
    /// Creates an engine backed by the production registry client.
    pub fn new(config: CollectionConfig) -> ImageFactsResult<Self> {
        let registry = Arc::new(RegistryClient::new(&config)?);
        Ok(Self::with_components(registry, Arc::new(LogProgress), config))
    }

    /// Creates an engine from explicit capability implementations.
    ///
    /// This is the construction seam: tests and embedders swap in their own registry access
    /// and progress reporting here.
    pub fn with_components(
        registry: Arc<dyn RegistryAccess>,
        progress: Arc<dyn ProgressReporter>,
        config: CollectionConfig,
    ) -> Self {
        let handler = ErrorHandler::new(
            *config.get_retry_count(),
            *config.get_retry_delay(),
            *config.get_fallback_mode(),
        );
        let cache = FactsCache::new(*config.get_cache_ttl());

        Self {
            registry,
            handler,
            cache,
            progress,
            config,
        }
    }

    /// Collects facts for every reference, sequentially and in input order.
    ///
    /// References are deduplicated by canonical form first. Every unique reference ends up in
    /// exactly one of the result's maps: facts (successes and fallback facts) or errors. The
    /// run itself only fails if result construction is impossible; per-reference outcomes live
    /// inside the result.
    pub async fn collect_image_facts(
        &self,
        references: &[String],
        cancel: &CancellationToken,
    ) -> ImageFactsResult<ImageCollectionResult> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let unique = dedupe_references(references);
        let mut statistics = CollectionStatistics {
            total_images: unique.len(),
            ..Default::default()
        };
        let mut facts_map = HashMap::new();
        let mut errors_map = HashMap::new();
        let mut error_collector = ErrorCollector::new();

        self.progress.collection_started(unique.len());

        for reference in &unique {
            if cancel.is_cancelled() {
                tracing::warn!("collection cancelled; {} references not processed", {
                    unique.len() - facts_map.len() - errors_map.len()
                });
                break;
            }

            self.progress.image_started(reference);

            let parsed = match reference.parse::<ImageReference>() {
                Ok(parsed) => parsed,
                Err(err) => {
                    let error = CollectionError::classify(reference.clone(), &err);
                    self.progress.image_failed(reference, &error);
                    error_collector.record(error.clone(), "");
                    errors_map.insert(reference.clone(), error);
                    statistics.failed_images += 1;
                    continue;
                }
            };

            if *self.config.get_cache_enabled() {
                if let Some(cached) = self.cache.get(reference) {
                    statistics.cache_hits += 1;
                    statistics.successful_images += 1;
                    self.progress.image_collected(reference);
                    facts_map.insert(reference.clone(), cached);
                    continue;
                }
                statistics.cache_misses += 1;
            }

            match self.collect_one(reference, &parsed, cancel).await {
                Ok(facts) => {
                    statistics.successful_images += 1;
                    self.progress.image_collected(reference);
                    if *self.config.get_cache_enabled() {
                        self.cache.insert(reference.clone(), facts.clone());
                    }
                    facts_map.insert(reference.clone(), facts);
                }
                Err(error) => {
                    statistics.failed_images += 1;
                    self.progress.image_failed(reference, &error);
                    error_collector.record(error.clone(), parsed.get_registry());
                    errors_map.insert(reference.clone(), error);
                }
            }
        }

        if error_collector.should_apply_fallback() {
            tracing::warn!(
                "{} collection errors recorded; consider a fallback mode",
                error_collector.errors().len(),
            );
        }

        statistics.registries_accessed = facts_map
            .values()
            .map(|facts| facts.registry.as_str())
            .collect::<HashSet<_>>()
            .len();

        self.progress.collection_completed(&statistics);

        Ok(ImageCollectionResult {
            facts: facts_map,
            errors: errors_map,
            statistics,
            duration: started.elapsed(),
            timestamp,
        })
    }

    /// Collects one reference: invoke the client, retry retryable errors with backoff, and
    /// fall back per policy once the retry budget is spent.
    async fn collect_one(
        &self,
        reference: &str,
        parsed: &ImageReference,
        cancel: &CancellationToken,
    ) -> Result<ImageFacts, CollectionError> {
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ImageFactsError::Cancelled),
                result = self.registry.get_image_facts(parsed) => result,
            };

            match outcome {
                Ok(mut facts) => {
                    if !*self.config.get_include_layers() {
                        facts.layers.clear();
                    }
                    return Ok(facts);
                }
                Err(err @ ImageFactsError::Cancelled) => {
                    return Err(CollectionError {
                        image_ref: reference.to_string(),
                        kind: super::ErrorKind::Unknown,
                        message: err.to_string(),
                        retryable: false,
                    });
                }
                Err(err) => {
                    let classified = CollectionError::classify(reference, &err);

                    // Non-retryable errors are surfaced immediately, but the fallback policy
                    // still gets its say: only FallbackMode::None turns them into errors.
                    if !classified.retryable {
                        return self.handler.handle_error(parsed, classified);
                    }

                    if attempt < *self.handler.get_retry_count() {
                        if let Err(cancelled) = self
                            .handler
                            .wait_before_retry(attempt, &classified, cancel)
                            .await
                        {
                            return Err(CollectionError {
                                image_ref: reference.to_string(),
                                kind: classified.kind,
                                message: cancelled.to_string(),
                                retryable: false,
                            });
                        }
                        attempt += 1;
                        continue;
                    }

                    return self.handler.handle_error(parsed, classified);
                }
            }
        }
    }

    /// Drops expired facts cache entries, returning how many were removed.
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup()
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Returns the registry-access capability the engine was constructed with.
    pub fn registry(&self) -> &Arc<dyn RegistryAccess> {
        &self.registry
    }
}
