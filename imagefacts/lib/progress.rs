//! Progress-reporting capability. Presentation surfaces (console, JSON, callbacks) live with
//! the caller; the engine only emits events.

use crate::collect::{CollectionError, CollectionStatistics};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Receives collection lifecycle events from the batch collector.
pub trait ProgressReporter: Send + Sync {
    /// A collection run is starting over the given number of unique references.
    fn collection_started(&self, total: usize);

    /// Work on one reference is starting.
    fn image_started(&self, reference: &str);

    /// Facts for one reference were recorded.
    fn image_collected(&self, reference: &str);

    /// One reference failed terminally.
    fn image_failed(&self, reference: &str, error: &CollectionError);

    /// The run finished with the given statistics.
    fn collection_completed(&self, statistics: &CollectionStatistics);
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

/// A reporter that emits events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl ProgressReporter for NoopProgress {
    fn collection_started(&self, _total: usize) {}

    fn image_started(&self, _reference: &str) {}

    fn image_collected(&self, _reference: &str) {}

    fn image_failed(&self, _reference: &str, _error: &CollectionError) {}

    fn collection_completed(&self, _statistics: &CollectionStatistics) {}
}

impl ProgressReporter for LogProgress {
    fn collection_started(&self, total: usize) {
        tracing::info!("collecting facts for {} images", total);
    }

    fn image_started(&self, reference: &str) {
        tracing::debug!("collecting {}", reference);
    }

    fn image_collected(&self, reference: &str) {
        tracing::debug!("collected {}", reference);
    }

    fn image_failed(&self, reference: &str, error: &CollectionError) {
        tracing::warn!("failed to collect {}: {}", reference, error.message);
    }

    fn collection_completed(&self, statistics: &CollectionStatistics) {
        tracing::info!(
            "collection finished: {} successful, {} failed, {} cache hits",
            statistics.successful_images,
            statistics.failed_images,
            statistics.cache_hits,
        );
    }
}
