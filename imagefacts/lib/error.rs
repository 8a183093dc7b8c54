use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an imagefacts-related operation.
pub type ImageFactsResult<T> = Result<T, ImageFactsError>;

/// An error that occurred while collecting image facts.
///
/// Display strings deliberately carry the operation and enough detail (status codes, body
/// snippets, header absence) for the collection error classifier to categorize them.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ImageFactsError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error that occurred when a Serde JSON error occurred.
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error that occurred while handling OCI spec types.
    #[error("oci spec error: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),

    /// An error that occurred when parsing an image reference.
    #[error("invalid image reference: {0}")]
    ImageReferenceError(String),

    /// An error that occurred when a registry rejected the request as unauthorized.
    #[error("authentication failed for {registry}: {message}")]
    AuthenticationFailed {
        /// The registry host the request was addressed to.
        registry: String,
        /// Detail about the rejection.
        message: String,
    },

    /// An error that occurred when a manifest was not found.
    #[error("manifest not found for {reference}: {message}")]
    ManifestNotFound {
        /// The canonical reference whose manifest was requested.
        reference: String,
        /// Detail about the missing manifest.
        message: String,
    },

    /// An error that occurred when a manifest body could not be understood.
    #[error("invalid manifest for {reference}: {message}")]
    InvalidManifest {
        /// The canonical reference whose manifest was requested.
        reference: String,
        /// Detail about the malformed manifest.
        message: String,
    },

    /// An error that occurred while fetching or parsing a config blob.
    #[error("config blob error for {reference}: {message}")]
    ConfigBlob {
        /// The canonical reference whose config blob was requested.
        reference: String,
        /// Detail about the blob failure.
        message: String,
    },

    /// An error that occurred at the transport level (timeouts, refused connections).
    #[error("network error during {operation}: {message}")]
    Network {
        /// The registry operation that was in flight.
        operation: String,
        /// The underlying transport failure.
        message: String,
    },

    /// An unexpected, non-auth, non-404 response from a registry.
    #[error("registry response error: status {status}: {snippet}")]
    RegistryResponse {
        /// The HTTP status code of the response.
        status: u16,
        /// A truncated snippet of the response body.
        snippet: String,
    },

    /// An error that occurred when a manifest response carried no digest header.
    #[error("digest header missing in manifest response for {0}")]
    DigestHeaderMissing(String),

    /// An error that occurred when the ambient deadline fired while waiting to retry.
    #[error("cancelled during retry: {0}")]
    CancelledDuringRetry(String),

    /// An error that occurred when the ambient deadline fired outside a retry wait.
    #[error("collection cancelled")]
    Cancelled,

    /// An error that occurred when a facts document violated the schema.
    #[error("facts validation error: {0}")]
    FactsValidation(String),

    /// An error that occurred when a feature is not yet implemented.
    #[error("feature not yet implemented: {0}")]
    NotImplemented(String),

    /// An error that occurred when invalid arguments were provided.
    #[error("{0}")]
    InvalidArgument(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageFactsError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> ImageFactsError {
        ImageFactsError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `ImageFactsResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> ImageFactsResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
