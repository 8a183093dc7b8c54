//! The integration façade: binds the engine to discovered cluster resources and writes the
//! `facts.json`, statistics, and error artifacts into a support bundle directory.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use getset::Getters;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{
    collect::{CollectionStatistics, CollectorEngine, ImageCollectionResult},
    facts::extract_pod_images,
    reference::{dedupe_references, ImageReference},
    ImageFactsResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The facts artifact filename.
pub const FACTS_FILENAME: &str = "facts.json";

/// The statistics artifact filename.
pub const STATS_FILENAME: &str = "image-collection-stats.json";

/// The errors artifact filename; written only when errors occurred.
pub const ERRORS_FILENAME: &str = "image-errors.json";

/// Workload kinds whose pod template lives under `spec.template.spec`.
const TEMPLATED_KINDS: &[&str] = &[
    "Deployment",
    "StatefulSet",
    "DaemonSet",
    "ReplicaSet",
    "Job",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One workload object handed over by the discovery collaborator.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
pub struct DiscoveredResource {
    /// The namespace the resource lives in.
    #[builder(setter(into))]
    namespace: String,

    /// The resource name.
    #[builder(setter(into))]
    name: String,

    /// The resource kind (Pod, Deployment, CronJob, ...).
    #[builder(setter(into))]
    kind: String,

    /// The resource manifest as discovered.
    manifest: Value,
}

/// The on-disk shape of `image-collection-stats.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport<'a> {
    /// How long the run took, in seconds.
    collection_time: f64,

    /// When the run started.
    timestamp: DateTime<Utc>,

    /// The raw run counters.
    statistics: &'a CollectionStatistics,

    /// Derived rates and totals.
    summary: StatsSummary,
}

/// The derived summary block of the statistics artifact.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsSummary {
    total_images: usize,
    successful_images: usize,
    failed_images: usize,
    success_rate: f64,
    cache_hit_rate: f64,
    registries_accessed: usize,
}

/// The on-disk shape of `image-errors.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport {
    /// When the run started.
    timestamp: DateTime<Utc>,

    /// One entry per failed reference.
    errors: Vec<ErrorReportEntry>,
}

/// One failed reference in the errors artifact.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReportEntry {
    /// The reference that failed.
    image_ref: String,

    /// The error message.
    error: String,

    /// The registry host the reference resolves to, when parseable.
    registry: String,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The file-writer capability supplied by the support-bundle collaborator.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Writes one named artifact.
    async fn write_artifact(&self, name: &str, contents: &[u8]) -> ImageFactsResult<()>;
}

/// Writes artifacts into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    /// The directory artifacts are written into.
    dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Types: Facade
//--------------------------------------------------------------------------------------------------

/// Binds the collection engine to discovered resources and a bundle writer.
pub struct BundleCollector {
    /// The collection engine.
    engine: CollectorEngine,

    /// The artifact writer.
    writer: Arc<dyn ArtifactWriter>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DirectoryWriter {
    /// Creates a writer rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BundleCollector {
    /// Creates a façade over an engine and a writer.
    pub fn new(engine: CollectorEngine, writer: Arc<dyn ArtifactWriter>) -> Self {
        Self { engine, writer }
    }

    /// Collects facts for every image the discovered resources reference and writes the
    /// bundle artifacts.
    ///
    /// `facts.json` and the statistics artifact are always written, even when every reference
    /// failed; the errors artifact exists iff at least one error was recorded.
    pub async fn collect_into_bundle(
        &self,
        resources: &[DiscoveredResource],
        cancel: &CancellationToken,
    ) -> ImageFactsResult<ImageCollectionResult> {
        let mut images = Vec::new();
        for resource in resources {
            images.extend(extract_resource_images(resource));
        }
        let images = dedupe_references(&images);

        tracing::info!(
            "collecting facts for {} unique images across {} resources",
            images.len(),
            resources.len(),
        );

        let result = self.engine.collect_image_facts(&images, cancel).await?;
        self.write_artifacts(&result).await?;

        Ok(result)
    }

    /// Collects facts for a flat list of image references and writes the bundle artifacts.
    pub async fn collect_references(
        &self,
        references: &[String],
        cancel: &CancellationToken,
    ) -> ImageFactsResult<ImageCollectionResult> {
        let result = self.engine.collect_image_facts(references, cancel).await?;
        self.write_artifacts(&result).await?;

        Ok(result)
    }

    /// Writes the facts, statistics, and (when needed) error artifacts for a run.
    async fn write_artifacts(&self, result: &ImageCollectionResult) -> ImageFactsResult<()> {
        let output = crate::output::FactsOutput::new(&result.facts, result.timestamp);
        self.writer
            .write_artifact(FACTS_FILENAME, output.to_pretty_json()?.as_bytes())
            .await?;

        let stats = StatsReport::new(result);
        self.writer
            .write_artifact(
                STATS_FILENAME,
                serde_json::to_string_pretty(&stats)?.as_bytes(),
            )
            .await?;

        if !result.errors.is_empty() {
            let report = ErrorReport::new(result);
            self.writer
                .write_artifact(
                    ERRORS_FILENAME,
                    serde_json::to_string_pretty(&report)?.as_bytes(),
                )
                .await?;
        }

        Ok(())
    }
}

impl<'a> StatsReport<'a> {
    /// Derives the statistics artifact from a run result.
    fn new(result: &'a ImageCollectionResult) -> Self {
        let statistics = &result.statistics;
        let total = statistics.total_images;
        let lookups = statistics.cache_hits + statistics.cache_misses;

        Self {
            collection_time: result.duration.as_secs_f64(),
            timestamp: result.timestamp,
            statistics,
            summary: StatsSummary {
                total_images: total,
                successful_images: statistics.successful_images,
                failed_images: statistics.failed_images,
                success_rate: if total == 0 {
                    0.0
                } else {
                    statistics.successful_images as f64 / total as f64
                },
                cache_hit_rate: if lookups == 0 {
                    0.0
                } else {
                    statistics.cache_hits as f64 / lookups as f64
                },
                registries_accessed: statistics.registries_accessed,
            },
        }
    }
}

impl ErrorReport {
    /// Derives the errors artifact from a run result.
    fn new(result: &ImageCollectionResult) -> Self {
        let mut errors: Vec<ErrorReportEntry> = result
            .errors
            .values()
            .map(|error| ErrorReportEntry {
                image_ref: error.image_ref.clone(),
                error: error.message.clone(),
                registry: error
                    .image_ref
                    .parse::<ImageReference>()
                    .map(|parsed| parsed.get_registry().clone())
                    .unwrap_or_default(),
            })
            .collect();
        errors.sort_by(|a, b| a.image_ref.cmp(&b.image_ref));

        Self {
            timestamp: result.timestamp,
            errors,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ArtifactWriter for DirectoryWriter {
    async fn write_artifact(&self, name: &str, contents: &[u8]) -> ImageFactsResult<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.dir.join(name), contents).await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Extracts image strings from a discovered resource's pod spec, wherever its kind nests it.
///
/// Bare pods carry `spec` directly; templated workloads nest it under `spec.template.spec`;
/// cron jobs under `spec.jobTemplate.spec.template.spec`.
pub fn extract_resource_images(resource: &DiscoveredResource) -> Vec<String> {
    let manifest = resource.get_manifest();

    let pod_spec = if resource.get_kind() == "CronJob" {
        manifest
            .pointer("/spec/jobTemplate/spec/template/spec")
    } else if TEMPLATED_KINDS.contains(&resource.get_kind().as_str()) {
        manifest.pointer("/spec/template/spec")
    } else {
        manifest.get("spec")
    };

    match pod_spec {
        Some(spec) => extract_pod_images(spec),
        None => {
            tracing::debug!(
                "resource {}/{} ({}) has no pod spec",
                resource.get_namespace(),
                resource.get_name(),
                resource.get_kind(),
            );
            Vec::new()
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(kind: &str, manifest: Value) -> DiscoveredResource {
        DiscoveredResource::builder()
            .namespace("default")
            .name("demo")
            .kind(kind)
            .manifest(manifest)
            .build()
    }

    #[test]
    fn test_bundle_extracts_images_from_pod() {
        let pod = resource(
            "Pod",
            json!({"spec": {"containers": [{"image": "nginx:latest"}]}}),
        );
        assert_eq!(extract_resource_images(&pod), vec!["nginx:latest"]);
    }

    #[test]
    fn test_bundle_extracts_images_from_deployment_template() {
        let deployment = resource(
            "Deployment",
            json!({
                "spec": {
                    "template": {
                        "spec": {
                            "containers": [{"image": "redis:7"}],
                            "initContainers": [{"image": "busybox:1.36"}]
                        }
                    }
                }
            }),
        );
        assert_eq!(
            extract_resource_images(&deployment),
            vec!["redis:7", "busybox:1.36"]
        );
    }

    #[test]
    fn test_bundle_extracts_images_from_cronjob_template() {
        let cronjob = resource(
            "CronJob",
            json!({
                "spec": {
                    "jobTemplate": {
                        "spec": {
                            "template": {
                                "spec": {"containers": [{"image": "backup:v3"}]}
                            }
                        }
                    }
                }
            }),
        );
        assert_eq!(extract_resource_images(&cronjob), vec!["backup:v3"]);
    }

    #[test]
    fn test_bundle_resource_without_pod_spec() {
        let configmap = resource("ConfigMap", json!({"data": {"key": "value"}}));
        assert!(extract_resource_images(&configmap).is_empty());
    }
}
