use chrono::{DateTime, Utc};
use serde::Deserialize;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Endpoint for acquiring Docker Hub authentication tokens, as described in the Docker Registry
/// authentication workflow.
pub const DOCKER_AUTH_REALM: &str = "https://auth.docker.io/token";

/// The service name used during Docker Hub token authentication.
pub const DOCKER_AUTH_SERVICE: &str = "registry.docker.io";

/// The bootstrap pull scope used when exchanging caller credentials for a Docker Hub token.
pub const DOCKER_AUTH_BOOTSTRAP_SCOPE: &str = "repository:library/alpine:pull";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Credentials for a registry host, installed at engine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCredentials {
    /// A username and password, exchanged for a bearer token when the registry supports it.
    UsernamePassword {
        /// The account username.
        username: String,
        /// The account password.
        password: String,
    },

    /// A bearer token used verbatim.
    Bearer(String),

    /// An identity or registry token used verbatim as a bearer credential.
    Identity(String),
}

/// The authorization applied to registry requests once authentication has resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// A bearer token.
    Bearer(String),

    /// HTTP basic authentication assembled from stored credentials.
    Basic {
        /// The account username.
        username: String,
        /// The account password.
        password: String,
    },
}

/// A token-exchange response from a registry's auth endpoint.
///
/// Registries disagree on whether the token lives under `token` or `access_token`; both are
/// accepted, `token` preferred.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The token used to authenticate subsequent requests.
    pub token: Option<String>,

    /// The OAuth2-style access token some registries return instead.
    pub access_token: Option<String>,

    /// The token lifetime in seconds.
    pub expires_in: Option<u32>,

    /// The time the token was issued.
    pub issued_at: Option<DateTime<Utc>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TokenResponse {
    /// Returns the usable token from the response, preferring `token` over `access_token`.
    pub fn into_token(self) -> Option<String> {
        self.token.or(self.access_token)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
