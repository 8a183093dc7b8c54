use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use serde::{Deserialize, Serialize};

use crate::{config::DEFAULT_FALLBACK_THRESHOLD, ImageFactsError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The closed taxonomy of collection error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The registry rejected the request as unauthenticated or unauthorized.
    Auth,

    /// A transport-level failure: timeout, refused or dropped connection.
    Network,

    /// The manifest was missing or malformed, or the reference was ill-formed.
    Manifest,

    /// The config blob could not be fetched or parsed.
    Config,

    /// Anything the patterns did not recognize.
    Unknown,
}

/// A classified error for one reference, driving retry and fallback decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionError {
    /// The reference string the error belongs to.
    pub image_ref: String,

    /// The classified kind.
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    /// The underlying error message.
    pub message: String,

    /// Whether the error is worth retrying.
    pub retryable: bool,
}

/// Aggregated counts over every classified error recorded in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatistics {
    /// The total number of recorded errors.
    pub total_errors: usize,

    /// Error counts per kind.
    pub by_kind: HashMap<ErrorKind, usize>,

    /// Error counts per registry host.
    pub by_registry: HashMap<String, usize>,
}

/// Accumulates classified errors and recommends when fallback facts are warranted.
#[derive(Debug)]
pub struct ErrorCollector {
    /// Every recorded error, in record order.
    errors: Vec<CollectionError>,

    /// Error counts per kind.
    by_kind: HashMap<ErrorKind, usize>,

    /// Error counts per registry host.
    by_registry: HashMap<String, usize>,

    /// How many recorded errors trigger the fallback recommendation.
    fallback_threshold: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ErrorKind {
    /// The lowercase name used in labels and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::Manifest => "manifest",
            ErrorKind::Config => "config",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl CollectionError {
    /// Classifies an engine error for the given reference.
    pub fn classify(image_ref: impl Into<String>, error: &ImageFactsError) -> Self {
        let message = error.to_string();
        let (kind, retryable) = classify_message(&message);
        Self {
            image_ref: image_ref.into(),
            kind,
            message,
            retryable,
        }
    }
}

impl ErrorCollector {
    /// Creates a collector with the default fallback threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_FALLBACK_THRESHOLD)
    }

    /// Creates a collector with an explicit fallback threshold.
    pub fn with_threshold(fallback_threshold: usize) -> Self {
        Self {
            errors: Vec::new(),
            by_kind: HashMap::new(),
            by_registry: HashMap::new(),
            fallback_threshold,
        }
    }

    /// Records a classified error against the registry it was observed on.
    pub fn record(&mut self, error: CollectionError, registry: &str) {
        *self.by_kind.entry(error.kind).or_default() += 1;
        *self.by_registry.entry(registry.to_string()).or_default() += 1;
        self.errors.push(error);
    }

    /// Returns the recorded errors in record order.
    pub fn errors(&self) -> &[CollectionError] {
        &self.errors
    }

    /// Produces the aggregate statistics over everything recorded so far.
    pub fn statistics(&self) -> ErrorStatistics {
        ErrorStatistics {
            total_errors: self.errors.len(),
            by_kind: self.by_kind.clone(),
            by_registry: self.by_registry.clone(),
        }
    }

    /// Recommends fallback facts once enough errors have accumulated.
    pub fn should_apply_fallback(&self) -> bool {
        self.errors.len() >= self.fallback_threshold
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Classifies an error message into a kind and a retryable bit.
///
/// Pattern matching over the lowercased message is deliberate: the underlying HTTP and JSON
/// errors are not structured. Patterns are checked in taxonomy order, so an authentication
/// message that also mentions a manifest still classifies as auth.
pub fn classify_message(message: &str) -> (ErrorKind, bool) {
    let lowered = message.to_lowercase();
    let contains_any =
        |patterns: &[&str]| patterns.iter().any(|pattern| lowered.contains(pattern));

    if contains_any(&["authentication", "unauthorized"]) {
        (ErrorKind::Auth, false)
    } else if contains_any(&["timeout", "deadline", "connection", "network"]) {
        (ErrorKind::Network, true)
    } else if contains_any(&["not found", "404"]) {
        (ErrorKind::Manifest, false)
    } else if contains_any(&["manifest", "invalid"]) {
        (ErrorKind::Manifest, false)
    } else if contains_any(&["config", "blob"]) {
        (ErrorKind::Config, true)
    } else {
        (ErrorKind::Unknown, true)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
