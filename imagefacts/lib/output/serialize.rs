use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{facts::ImageFacts, ImageFactsResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The schema version the serializer emits and the validator accepts.
pub const FACTS_SCHEMA_VERSION: &str = "v1";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The versioned on-disk envelope for `facts.json`.
///
/// Maps are ordered so the document is byte-stable across runs with identical facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactsOutput {
    /// The schema version; always [`FACTS_SCHEMA_VERSION`].
    pub version: String,

    /// When the document was produced.
    pub timestamp: DateTime<Utc>,

    /// The collected facts, keyed by the caller's reference strings.
    pub facts: BTreeMap<String, ImageFacts>,

    /// Aggregates derivable from `facts`.
    pub summary: FactsSummary,
}

/// Aggregate counts over a facts map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactsSummary {
    /// The number of facts records.
    pub total_images: usize,

    /// Image counts per registry host.
    pub registries: BTreeMap<String, usize>,

    /// Image counts per `<os>/<arch>` platform key.
    pub platforms: BTreeMap<String, usize>,

    /// The sum of all image sizes in bytes.
    pub total_size: i64,

    /// The size of the largest image in bytes.
    pub largest_image_size: i64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FactsOutput {
    /// Builds the envelope for a facts map, deriving the summary in one pass.
    pub fn new(facts: &HashMap<String, ImageFacts>, timestamp: DateTime<Utc>) -> Self {
        let ordered: BTreeMap<String, ImageFacts> = facts
            .iter()
            .map(|(reference, image_facts)| (reference.clone(), image_facts.clone()))
            .collect();

        let summary = build_summary(ordered.values());

        Self {
            version: FACTS_SCHEMA_VERSION.to_string(),
            timestamp,
            facts: ordered,
            summary,
        }
    }

    /// Serializes the envelope as pretty-printed JSON.
    pub fn to_pretty_json(&self) -> ImageFactsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serializes the envelope as compact JSON.
    pub fn to_compact_json(&self) -> ImageFactsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope back from JSON bytes.
    pub fn from_json(data: &[u8]) -> ImageFactsResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Derives summary aggregates from facts records in a single pass.
pub fn build_summary<'a>(facts: impl Iterator<Item = &'a ImageFacts>) -> FactsSummary {
    let mut summary = FactsSummary::default();

    for image_facts in facts {
        summary.total_images += 1;
        *summary
            .registries
            .entry(image_facts.registry.clone())
            .or_default() += 1;
        *summary
            .platforms
            .entry(image_facts.platform.summary_key())
            .or_default() += 1;
        summary.total_size += image_facts.size;
        summary.largest_image_size = summary.largest_image_size.max(image_facts.size);
    }

    summary
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::PlatformInfo;

    fn stub_facts(repository: &str, registry: &str, size: i64) -> ImageFacts {
        ImageFacts {
            repository: repository.to_string(),
            tag: "latest".to_string(),
            digest: Some(format!("sha256:{}", "f".repeat(64))),
            registry: registry.to_string(),
            size,
            created: Utc::now(),
            labels: Default::default(),
            platform: PlatformInfo::default(),
            layers: Vec::new(),
            config: None,
        }
    }

    #[test]
    fn test_serialize_summary_aggregation() {
        let mut facts = HashMap::new();
        facts.insert(
            "nginx:latest".to_string(),
            stub_facts("library/nginx", "index.docker.io", 100),
        );
        facts.insert(
            "busybox:latest".to_string(),
            stub_facts("library/busybox", "index.docker.io", 50),
        );
        facts.insert(
            "gcr.io/p/app:v1".to_string(),
            stub_facts("p/app", "gcr.io", 300),
        );

        let output = FactsOutput::new(&facts, Utc::now());
        assert_eq!(output.version, FACTS_SCHEMA_VERSION);
        assert_eq!(output.summary.total_images, 3);
        assert_eq!(output.summary.registries.get("index.docker.io"), Some(&2));
        assert_eq!(output.summary.registries.get("gcr.io"), Some(&1));
        assert_eq!(output.summary.platforms.get("linux/amd64"), Some(&3));
        assert_eq!(output.summary.total_size, 450);
        assert_eq!(output.summary.largest_image_size, 300);
    }

    #[test]
    fn test_serialize_round_trip_preserves_facts() {
        let mut facts = HashMap::new();
        facts.insert(
            "nginx:latest".to_string(),
            stub_facts("library/nginx", "index.docker.io", 100),
        );

        let output = FactsOutput::new(&facts, Utc::now());
        let pretty = output.to_pretty_json().unwrap();
        let reparsed = FactsOutput::from_json(pretty.as_bytes()).unwrap();
        assert_eq!(output, reparsed);

        let compact = output.to_compact_json().unwrap();
        let reparsed = FactsOutput::from_json(compact.as_bytes()).unwrap();
        assert_eq!(output, reparsed);
    }

    #[test]
    fn test_serialize_empty_facts_summary_zeros() {
        let output = FactsOutput::new(&HashMap::new(), Utc::now());
        assert_eq!(output.summary.total_images, 0);
        assert_eq!(output.summary.total_size, 0);
        assert!(output.summary.registries.is_empty());
    }
}
