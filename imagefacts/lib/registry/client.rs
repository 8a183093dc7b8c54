use std::{
    collections::HashMap,
    sync::RwLock,
    time::Duration,
};

use async_trait::async_trait;
use oci_spec::image::{Digest, ImageConfiguration, ImageIndex, ImageManifest};
use reqwest::{header, Client, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::{
    config::{CollectionConfig, USER_AGENT},
    facts::{FactsBuilder, FactsBuilding, ImageFacts},
    reference::ImageReference,
    ImageFactsError, ImageFactsResult,
};

use super::{
    hosts, is_index_media_type, select_platform_manifest, AuthHeader, ManifestInfo,
    RegistryAccess, RegistryCredentials, TokenResponse, DOCKER_AUTH_BOOTSTRAP_SCOPE,
    DOCKER_AUTH_REALM, DOCKER_AUTH_SERVICE, DOCKER_CONFIG_MIME_TYPE, DOCKER_MANIFEST_MIME_TYPE,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The Accept list sent on manifest endpoints: Docker v2 single, OCI v1 single, and Docker v2
/// list media types.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.list.v2+json";

/// The registry response header carrying the manifest digest.
const DOCKER_CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// The fallback digest header some registries use instead.
const CONTENT_DIGEST_HEADER: &str = "content-digest";

/// How many transient transport retries the HTTP middleware performs underneath the engine's
/// classified retry policy.
const TRANSPORT_MAX_RETRIES: u32 = 2;

/// How much of an error response body is kept in error messages.
const BODY_SNIPPET_LEN: usize = 200;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A client for the OCI distribution and Docker Registry v2 HTTP APIs.
///
/// Handles authentication (anonymous, basic, bearer with token exchange), manifest HEAD/GET,
/// and config blob fetches. Credentials and resolved authorization headers are keyed by
/// registry host; reads never hold the lock across an await.
///
/// [See the OCI distribution specification for the endpoint shapes][OCI Distribution Spec]
///
/// [OCI Distribution Spec]: https://distribution.github.io/distribution/spec/api/#introduction
#[derive(Debug)]
pub struct RegistryClient {
    /// The HTTP client used for all registry exchanges.
    client: ClientWithMiddleware,

    /// Credentials installed per registry host.
    credentials: RwLock<HashMap<String, RegistryCredentials>>,

    /// Authorization headers resolved per registry host.
    auth_headers: RwLock<HashMap<String, AuthHeader>>,

    /// Whether config blobs are fetched and embedded in facts.
    include_config: bool,

    /// The facts builder used to compose records.
    builder: FactsBuilder,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryClient {
    /// Creates a client from the engine configuration.
    ///
    /// The per-exchange timeout and credential map come from the configuration; the transport
    /// retries transient failures underneath the engine's classified retry policy.
    pub fn new(config: &CollectionConfig) -> ImageFactsResult<Self> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(TRANSPORT_MAX_RETRIES);
        let inner = Client::builder()
            .timeout(*config.get_timeout())
            .user_agent(USER_AGENT)
            .build()?;
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            credentials: RwLock::new(config.get_credentials().clone()),
            auth_headers: RwLock::new(HashMap::new()),
            include_config: *config.get_include_config(),
            builder: FactsBuilder::new(),
        })
    }

    /// Creates a client with default options and a custom per-exchange timeout.
    pub fn with_timeout(timeout: Duration) -> ImageFactsResult<Self> {
        Self::new(&CollectionConfig::builder().timeout(timeout).build())
    }

    /// Installs credentials for a registry host without performing a token exchange.
    pub fn set_credentials(&self, registry: impl Into<String>, credentials: RegistryCredentials) {
        self.credentials
            .write()
            .expect("credentials lock poisoned")
            .insert(registry.into(), credentials);
    }

    /// Exchanges a username and password for a bearer token at the registry's token endpoint.
    ///
    /// Docker Hub uses the well-known `auth.docker.io` realm with a bootstrap pull scope;
    /// other registries are tried at their per-registry `/v2/token` endpoint.
    async fn exchange_token(
        &self,
        registry: &str,
        username: &str,
        password: &str,
    ) -> ImageFactsResult<String> {
        let (realm, service) = if hosts::is_docker_hub(registry) {
            (DOCKER_AUTH_REALM.to_string(), DOCKER_AUTH_SERVICE.to_string())
        } else {
            (format!("https://{}/v2/token", registry), registry.to_string())
        };

        let request = self
            .client
            .get(&realm)
            .query(&[
                ("service", service.as_str()),
                ("scope", DOCKER_AUTH_BOOTSTRAP_SCOPE),
            ])
            .basic_auth(username, Some(password))
            .build()?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| transport_error("token exchange", err))?;

        if !response.status().is_success() {
            return Err(ImageFactsError::AuthenticationFailed {
                registry: registry.to_string(),
                message: format!("token endpoint returned status {}", response.status()),
            });
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|err| ImageFactsError::AuthenticationFailed {
                registry: registry.to_string(),
                message: format!("token endpoint returned a non-token body: {}", err),
            })?;

        token_response
            .into_token()
            .ok_or_else(|| ImageFactsError::AuthenticationFailed {
                registry: registry.to_string(),
                message: "token exchange response contained no token".to_string(),
            })
    }

    /// Fetches an anonymous pull token from Docker Hub, scoped to the repository.
    ///
    /// Hub tokens are short-lived, so one is fetched per request rather than cached.
    async fn anonymous_docker_hub_token(&self, repository: &str) -> ImageFactsResult<String> {
        let scope = format!("repository:{}:pull", repository);
        let request = self
            .client
            .get(DOCKER_AUTH_REALM)
            .query(&[("service", DOCKER_AUTH_SERVICE), ("scope", scope.as_str())])
            .build()?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| transport_error("anonymous token exchange", err))?;

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|err| ImageFactsError::AuthenticationFailed {
                registry: "index.docker.io".to_string(),
                message: format!("anonymous token endpoint returned a non-token body: {}", err),
            })?;

        token_response
            .into_token()
            .ok_or_else(|| ImageFactsError::AuthenticationFailed {
                registry: "index.docker.io".to_string(),
                message: "anonymous token exchange response contained no token".to_string(),
            })
    }

    /// Resolves the authorization to apply for a request against a registry.
    ///
    /// A previously resolved header wins; stored credentials trigger authentication on first
    /// use; Docker Hub gets a fresh anonymous pull token; other registries are tried without
    /// authorization.
    async fn auth_for(
        &self,
        registry: &str,
        repository: &str,
    ) -> ImageFactsResult<Option<AuthHeader>> {
        {
            let headers = self.auth_headers.read().expect("auth header lock poisoned");
            if let Some(header) = headers.get(registry) {
                return Ok(Some(header.clone()));
            }
        }

        let stored = {
            let credentials = self.credentials.read().expect("credentials lock poisoned");
            credentials.get(registry).cloned()
        };

        if let Some(credentials) = stored {
            self.authenticate(registry, Some(&credentials)).await?;
            let headers = self.auth_headers.read().expect("auth header lock poisoned");
            return Ok(headers.get(registry).cloned());
        }

        if hosts::is_docker_hub(registry) {
            let token = self.anonymous_docker_hub_token(repository).await?;
            return Ok(Some(AuthHeader::Bearer(token)));
        }

        Ok(None)
    }

    /// Applies a resolved authorization header to a request.
    fn apply_auth(request: RequestBuilder, auth: Option<AuthHeader>) -> RequestBuilder {
        match auth {
            Some(AuthHeader::Bearer(token)) => request.bearer_auth(token),
            Some(AuthHeader::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        }
    }

    /// Issues a manifest request (GET or HEAD) and maps error statuses.
    async fn manifest_request(
        &self,
        reference: &ImageReference,
        head: bool,
    ) -> ImageFactsResult<Response> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            hosts::registry_base_url(reference.get_registry()),
            reference.get_repository(),
            reference.manifest_selector(),
        );

        let auth = self
            .auth_for(reference.get_registry(), reference.get_repository())
            .await?;
        let request = if head {
            self.client.head(&url)
        } else {
            self.client.get(&url)
        };
        let request = Self::apply_auth(request, auth)
            .header(header::ACCEPT, MANIFEST_ACCEPT)
            .build()?;

        let operation = if head { "manifest head" } else { "manifest get" };
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| transport_error(operation, err))?;

        self.check_status(reference, response, "manifest").await
    }

    /// Maps a non-success response into the typed error the classifier expects.
    async fn check_status(
        &self,
        reference: &ImageReference,
        response: Response,
        what: &str,
    ) -> ImageFactsResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ImageFactsError::AuthenticationFailed {
                    registry: reference.get_registry().clone(),
                    message: format!("status {} unauthorized response from registry", status),
                })
            }
            StatusCode::NOT_FOUND => Err(ImageFactsError::ManifestNotFound {
                reference: reference.canonical(),
                message: format!("{} not found (404)", what),
            }),
            _ => {
                let snippet = body_snippet(response).await;
                Err(ImageFactsError::RegistryResponse {
                    status: status.as_u16(),
                    snippet,
                })
            }
        }
    }

    /// Fetches a single-platform manifest by digest, used when following an index.
    async fn fetch_manifest_by_digest(
        &self,
        reference: &ImageReference,
        digest: &Digest,
    ) -> ImageFactsResult<ImageManifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            hosts::registry_base_url(reference.get_registry()),
            reference.get_repository(),
            digest,
        );

        let auth = self
            .auth_for(reference.get_registry(), reference.get_repository())
            .await?;
        let request = Self::apply_auth(self.client.get(&url), auth)
            .header(header::ACCEPT, MANIFEST_ACCEPT)
            .build()?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| transport_error("manifest get", err))?;
        let response = self.check_status(reference, response, "manifest").await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| ImageFactsError::InvalidManifest {
            reference: reference.canonical(),
            message: format!("manifest body is not parseable json: {}", err),
        })
    }

    /// Fetches and parses the config blob named by a manifest's config descriptor.
    async fn fetch_config(
        &self,
        reference: &ImageReference,
        digest: &str,
    ) -> ImageFactsResult<ImageConfiguration> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            hosts::registry_base_url(reference.get_registry()),
            reference.get_repository(),
            digest,
        );

        let auth = self
            .auth_for(reference.get_registry(), reference.get_repository())
            .await?;
        let request = Self::apply_auth(self.client.get(&url), auth)
            .header(header::ACCEPT, DOCKER_CONFIG_MIME_TYPE)
            .build()?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| transport_error("config blob get", err))?;

        let status = response.status();
        if !status.is_success() {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(ImageFactsError::AuthenticationFailed {
                    registry: reference.get_registry().clone(),
                    message: format!("status {} unauthorized response from registry", status),
                });
            }
            let snippet = body_snippet(response).await;
            return Err(ImageFactsError::ConfigBlob {
                reference: reference.canonical(),
                message: format!("blob fetch returned status {}: {}", status, snippet),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| ImageFactsError::ConfigBlob {
            reference: reference.canonical(),
            message: format!("blob body is not parseable json: {}", err),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl RegistryAccess for RegistryClient {
    async fn get_image_facts(&self, reference: &ImageReference) -> ImageFactsResult<ImageFacts> {
        let manifest = self.parse_manifest(reference).await?;

        let config = if self.include_config {
            match manifest.config_digest() {
                Some(digest) => Some(self.fetch_config(reference, &digest).await?),
                None => None,
            }
        } else {
            None
        };

        let mut facts = self.builder.build_facts(reference, &manifest, config.as_ref());

        if facts.digest.is_none() {
            match self.resolve_digest(reference).await {
                Ok(digest) => facts.digest = Some(digest),
                Err(err) => {
                    tracing::debug!(
                        "digest resolution failed for {}: {}",
                        reference.canonical(),
                        err
                    );
                }
            }
        }

        Ok(facts)
    }

    async fn resolve_digest(&self, reference: &ImageReference) -> ImageFactsResult<String> {
        let response = self.manifest_request(reference, true).await?;

        let digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST_HEADER)
            .or_else(|| response.headers().get(CONTENT_DIGEST_HEADER))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        digest.ok_or_else(|| ImageFactsError::DigestHeaderMissing(reference.canonical()))
    }

    async fn parse_manifest(&self, reference: &ImageReference) -> ImageFactsResult<ManifestInfo> {
        let response = self.manifest_request(reference, false).await?;

        let digest_header = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST_HEADER)
            .or_else(|| response.headers().get(CONTENT_DIGEST_HEADER))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DOCKER_MANIFEST_MIME_TYPE)
            .to_string();

        let body = response.text().await?;

        if is_index_media_type(&content_type) {
            let index: ImageIndex =
                serde_json::from_str(&body).map_err(|err| ImageFactsError::InvalidManifest {
                    reference: reference.canonical(),
                    message: format!("manifest list body is not parseable json: {}", err),
                })?;

            let descriptor = select_platform_manifest(&index).ok_or_else(|| {
                ImageFactsError::ManifestNotFound {
                    reference: reference.canonical(),
                    message: "manifest list contains no usable platform manifest".to_string(),
                }
            })?;

            let platform = descriptor.platform().clone();
            let digest = descriptor.digest().clone();
            let manifest = self.fetch_manifest_by_digest(reference, &digest).await?;

            return Ok(ManifestInfo::from_image_manifest(
                DOCKER_MANIFEST_MIME_TYPE,
                Some(digest.to_string()),
                &manifest,
                platform,
            ));
        }

        let manifest: ImageManifest =
            serde_json::from_str(&body).map_err(|err| ImageFactsError::InvalidManifest {
                reference: reference.canonical(),
                message: format!("manifest body is not parseable json: {}", err),
            })?;

        Ok(ManifestInfo::from_image_manifest(
            content_type,
            digest_header,
            &manifest,
            None,
        ))
    }

    async fn authenticate(
        &self,
        registry: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> ImageFactsResult<()> {
        let Some(credentials) = credentials else {
            return Err(ImageFactsError::AuthenticationFailed {
                registry: registry.to_string(),
                message: "no credentials supplied".to_string(),
            });
        };

        self.set_credentials(registry, credentials.clone());

        let header = match credentials {
            RegistryCredentials::Bearer(token) | RegistryCredentials::Identity(token) => {
                AuthHeader::Bearer(token.clone())
            }
            RegistryCredentials::UsernamePassword { username, password } => {
                match self.exchange_token(registry, username, password).await {
                    Ok(token) => AuthHeader::Bearer(token),
                    Err(err) => {
                        tracing::debug!(
                            "token exchange failed for {}, falling back to basic auth: {}",
                            registry,
                            err
                        );
                        AuthHeader::Basic {
                            username: username.clone(),
                            password: password.clone(),
                        }
                    }
                }
            }
        };

        self.auth_headers
            .write()
            .expect("auth header lock poisoned")
            .insert(registry.to_string(), header);

        Ok(())
    }

    fn supports_registry(&self, host: &str) -> bool {
        hosts::supports_registry(host)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps a transport-level failure into the typed error the classifier expects.
///
/// Timeouts and connection failures surface as network errors; everything else stays a
/// middleware error.
fn transport_error(operation: &str, err: reqwest_middleware::Error) -> ImageFactsError {
    if let reqwest_middleware::Error::Reqwest(inner) = &err {
        if inner.is_timeout() || inner.is_connect() {
            return ImageFactsError::Network {
                operation: operation.to_string(),
                message: inner.to_string(),
            };
        }
    }

    ImageFactsError::HttpMiddleware(err)
}

/// Reads a truncated snippet of an error response body.
async fn body_snippet(response: Response) -> String {
    match response.text().await {
        Result::Ok(body) => body.chars().take(BODY_SNIPPET_LEN).collect(),
        Err(_) => String::new(),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
