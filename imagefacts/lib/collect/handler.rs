use std::{
    collections::HashMap,
    fmt::{self, Display},
    time::Duration,
};

use chrono::Utc;
use getset::Getters;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    config::MAX_RETRY_BACKOFF,
    facts::{ImageFacts, PlatformInfo},
    reference::ImageReference,
    registry::classify_registry,
    ImageFactsError, ImageFactsResult,
};

use super::CollectionError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Labels inferred from well-known repository substrings by best-effort fallback.
const APPLICATION_HINTS: &[(&str, &[(&str, &str)])] = &[
    ("nginx", &[("application.type", "webserver"), ("application.name", "nginx")]),
    ("redis", &[("application.type", "database"), ("application.name", "redis")]),
    ("postgres", &[("application.type", "database"), ("application.name", "postgresql")]),
    ("mysql", &[("application.type", "database"), ("application.name", "mysql")]),
    ("alpine", &[("base.image", "alpine"), ("image.type", "minimal")]),
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What the engine produces for a reference whose retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackMode {
    /// Report the classified error; no facts are synthesized.
    None,

    /// Synthesize minimal facts from the parsed reference with an unknown platform.
    Partial,

    /// Like `Partial`, but with default platform assumptions and labels inferred from the
    /// reference.
    BestEffort,

    /// Serve facts from a persistent cache. Unsupported in v1; fails.
    Cached,
}

/// Applies the retry and fallback policy to classified errors.
///
/// The handler owns the backoff schedule and fallback materialization; it never re-invokes the
/// registry client itself. The batch collector drives the repeated attempts, consulting the
/// handler between them.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ErrorHandler {
    /// The maximum number of additional attempts for retryable errors.
    retry_count: u32,

    /// The initial backoff delay; doubles each attempt.
    retry_delay: Duration,

    /// The fallback behavior applied once retries are exhausted.
    fallback_mode: FallbackMode,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ErrorHandler {
    /// Creates a handler with the given retry budget and fallback mode.
    pub fn new(retry_count: u32, retry_delay: Duration, fallback_mode: FallbackMode) -> Self {
        Self {
            retry_count,
            retry_delay,
            fallback_mode,
        }
    }

    /// Returns the backoff before the given zero-based retry attempt.
    ///
    /// Exponential doubling from the configured delay, capped at one minute.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .retry_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        doubled.min(MAX_RETRY_BACKOFF)
    }

    /// Suspends until the backoff for the given attempt elapses or the ambient deadline is
    /// cancelled, whichever comes first.
    ///
    /// Cancellation surfaces the original error wrapped with a cancelled-during-retry
    /// indication.
    pub async fn wait_before_retry(
        &self,
        attempt: u32,
        original: &CollectionError,
        cancel: &CancellationToken,
    ) -> ImageFactsResult<()> {
        let delay = self.backoff_delay(attempt);
        tracing::debug!(
            "retrying {} in {:?} (attempt {} of {})",
            original.image_ref,
            delay,
            attempt + 1,
            self.retry_count,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ImageFactsError::CancelledDuringRetry(
                original.message.clone(),
            )),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Turns an exhausted error into fallback facts or a terminal error, per the configured
    /// mode.
    pub fn handle_error(
        &self,
        reference: &ImageReference,
        error: CollectionError,
    ) -> Result<ImageFacts, CollectionError> {
        match self.fallback_mode {
            FallbackMode::None => Err(error),
            FallbackMode::Partial => Ok(self.partial_fallback(reference, &error)),
            FallbackMode::BestEffort => Ok(self.best_effort_fallback(reference, &error)),
            FallbackMode::Cached => {
                tracing::warn!(
                    "cached fallback requested for {} but no persistent cache exists",
                    error.image_ref,
                );
                Err(error)
            }
        }
    }

    /// Synthesizes minimal facts carrying nothing but the parsed reference and error context.
    fn partial_fallback(
        &self,
        reference: &ImageReference,
        error: &CollectionError,
    ) -> ImageFacts {
        let mut facts = fallback_skeleton(reference);
        facts.platform = PlatformInfo::unknown();
        facts.labels = diagnostic_labels(error, "partial");
        facts
    }

    /// Synthesizes facts with default platform assumptions and labels inferred from the
    /// reference.
    fn best_effort_fallback(
        &self,
        reference: &ImageReference,
        error: &CollectionError,
    ) -> ImageFacts {
        let mut facts = fallback_skeleton(reference);
        facts.platform = PlatformInfo::default();

        let mut labels = diagnostic_labels(error, "best-effort");

        for (needle, hints) in APPLICATION_HINTS {
            if reference.get_repository().contains(needle) {
                for (key, value) in *hints {
                    labels.insert((*key).to_string(), (*value).to_string());
                }
            }
        }

        let kind = classify_registry(reference.get_registry());
        labels.insert("registry.type".to_string(), kind.label_type().to_string());
        if let Some(provider) = kind.provider() {
            labels.insert("registry.provider".to_string(), provider.to_string());
        }

        facts.labels = labels;
        facts
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for FallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FallbackMode::None => "none",
            FallbackMode::Partial => "partial",
            FallbackMode::BestEffort => "best-effort",
            FallbackMode::Cached => "cached",
        };
        write!(f, "{}", name)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The facts skeleton every fallback mode starts from.
fn fallback_skeleton(reference: &ImageReference) -> ImageFacts {
    ImageFacts {
        repository: reference.get_repository().clone(),
        tag: reference.get_tag().clone(),
        digest: reference.get_digest().clone(),
        registry: reference.get_registry().clone(),
        size: 0,
        created: Utc::now(),
        labels: HashMap::new(),
        platform: PlatformInfo::default(),
        layers: Vec::new(),
        config: None,
    }
}

/// The diagnostic labels every fallback record carries.
fn diagnostic_labels(error: &CollectionError, mode: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(
        "collection.error".to_string(),
        error.kind.as_str().to_string(),
    );
    labels.insert(
        "collection.error.message".to_string(),
        error.message.clone(),
    );
    labels.insert("collection.fallback".to_string(), mode.to_string());
    labels
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::ErrorKind;

    fn network_error(image_ref: &str) -> CollectionError {
        CollectionError {
            image_ref: image_ref.to_string(),
            kind: ErrorKind::Network,
            message: "network error during manifest get: connection refused".to_string(),
            retryable: true,
        }
    }

    #[test]
    fn test_handler_backoff_doubles_and_caps() {
        let handler = ErrorHandler::new(5, Duration::from_secs(1), FallbackMode::None);
        assert_eq!(handler.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(handler.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(handler.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(handler.backoff_delay(10), MAX_RETRY_BACKOFF);
    }

    #[test]
    fn test_handler_none_mode_reports_error() {
        let handler = ErrorHandler::new(0, Duration::from_millis(1), FallbackMode::None);
        let reference = "nginx:latest".parse::<ImageReference>().unwrap();
        let err = handler
            .handle_error(&reference, network_error("nginx:latest"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[test]
    fn test_handler_partial_fallback_labels_and_platform() {
        let handler = ErrorHandler::new(0, Duration::from_millis(1), FallbackMode::Partial);
        let reference = "nginx:latest".parse::<ImageReference>().unwrap();
        let facts = handler
            .handle_error(&reference, network_error("nginx:latest"))
            .unwrap();

        assert_eq!(facts.repository, "library/nginx");
        assert_eq!(facts.platform, PlatformInfo::unknown());
        assert!(facts.layers.is_empty());
        assert_eq!(
            facts.labels.get("collection.error").map(String::as_str),
            Some("network")
        );
        assert_eq!(
            facts.labels.get("collection.fallback").map(String::as_str),
            Some("partial")
        );
        assert!(facts.labels.contains_key("collection.error.message"));
    }

    #[test]
    fn test_handler_best_effort_fallback_hints_for_docker_hub() {
        let handler = ErrorHandler::new(0, Duration::from_millis(1), FallbackMode::BestEffort);
        let reference = "nginx:latest".parse::<ImageReference>().unwrap();
        let facts = handler
            .handle_error(&reference, network_error("nginx:latest"))
            .unwrap();

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
        assert_eq!(
            facts.labels.get("application.type").map(String::as_str),
            Some("webserver")
        );
        assert_eq!(
            facts.labels.get("application.name").map(String::as_str),
            Some("nginx")
        );
    }

    #[test]
    fn test_handler_best_effort_fallback_gcr_provider() {
        let handler = ErrorHandler::new(0, Duration::from_millis(1), FallbackMode::BestEffort);
        let reference = "gcr.io/my-project/my-app:v1.0".parse::<ImageReference>().unwrap();
        let mut error = network_error("gcr.io/my-project/my-app:v1.0");
        error.kind = ErrorKind::Auth;
        let facts = handler.handle_error(&reference, error).unwrap();

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

    #[test]
    fn test_handler_alpine_hints() {
        let handler = ErrorHandler::new(0, Duration::from_millis(1), FallbackMode::BestEffort);
        let reference = "alpine:3.19".parse::<ImageReference>().unwrap();
        let facts = handler
            .handle_error(&reference, network_error("alpine:3.19"))
            .unwrap();
        assert_eq!(facts.labels.get("base.image").map(String::as_str), Some("alpine"));
        assert_eq!(facts.labels.get("image.type").map(String::as_str), Some("minimal"));
    }

    #[test]
    fn test_handler_cached_mode_unsupported() {
        let handler = ErrorHandler::new(0, Duration::from_millis(1), FallbackMode::Cached);
        let reference = "nginx:latest".parse::<ImageReference>().unwrap();
        assert!(handler
            .handle_error(&reference, network_error("nginx:latest"))
            .is_err());
    }

    #[tokio::test]
    async fn test_handler_wait_cancelled_wraps_original_error() {
        let handler = ErrorHandler::new(3, Duration::from_secs(30), FallbackMode::None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = handler
            .wait_before_retry(0, &network_error("nginx:latest"), &cancel)
            .await
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("cancelled during retry"));
        assert!(rendered.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_handler_wait_elapses_without_cancellation() {
        let handler = ErrorHandler::new(3, Duration::from_millis(5), FallbackMode::None);
        let cancel = CancellationToken::new();
        handler
            .wait_before_retry(0, &network_error("nginx:latest"), &cancel)
            .await
            .unwrap();
    }
}
