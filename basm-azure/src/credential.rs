//! Access tokens for Azure Resource Manager and Blob Storage.
//!
//! Two sources are supported: a service principal secret (OAuth2 client
//! credentials) and the instance metadata service of a managed identity.
//! Both cache tokens per scope until shortly before they expire.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use basm_core::ServiceError;

pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can hand out a bearer token for a scope.
pub trait TokenSource: Send + Sync {
    fn token(&self, scope: &str) -> Result<String, ServiceError>;
}

// ---------------------------------------------------------------------------
// Token cache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Debug, Default)]
struct TokenCache {
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl TokenCache {
    fn get_or_fetch(
        &self,
        scope: &str,
        fetch: impl FnOnce() -> Result<TokenResponse, ServiceError>,
    ) -> Result<String, ServiceError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| ServiceError::Auth("token cache poisoned".into()))?;
        if let Some(cached) = tokens.get(scope) {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let response = fetch()?;
        let lifetime = Duration::from_secs(response.expires_in.seconds()?);
        tokens.insert(
            scope.to_owned(),
            CachedToken {
                token: response.access_token.clone(),
                refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
            },
        );
        tracing::debug!(scope, lifetime_secs = lifetime.as_secs(), "acquired access token");
        Ok(response.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Seconds,
}

/// Entra ID answers with a number, the metadata service with a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    fn seconds(&self) -> Result<u64, ServiceError> {
        match self {
            Seconds::Number(n) => Ok(*n),
            Seconds::Text(s) => s
                .parse()
                .map_err(|_| ServiceError::Auth(format!("invalid token lifetime '{s}'"))),
        }
    }
}

fn token_request_failed(endpoint: &str, err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(status, response) => ServiceError::Auth(format!(
            "token endpoint {endpoint} returned HTTP {status}: {}",
            response.into_string().unwrap_or_default()
        )),
        ureq::Error::Transport(transport) => {
            ServiceError::Auth(format!("token endpoint {endpoint} unreachable: {transport}"))
        }
    }
}

fn decode_token(endpoint: &str, response: ureq::Response) -> Result<TokenResponse, ServiceError> {
    response.into_json().map_err(|e| {
        ServiceError::Auth(format!("invalid token response from {endpoint}: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Service principal
// ---------------------------------------------------------------------------

/// OAuth2 client-credentials flow for a service principal.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    agent: ureq::Agent,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_owned(),
            agent: ureq::AgentBuilder::new().timeout(TOKEN_TIMEOUT).build(),
            cache: TokenCache::default(),
        }
    }

    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_owned();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }
}

impl TokenSource for ClientSecretCredential {
    fn token(&self, scope: &str) -> Result<String, ServiceError> {
        self.cache.get_or_fetch(scope, || {
            let endpoint = self.endpoint();
            let response = self
                .agent
                .post(&endpoint)
                .send_form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", scope),
                ])
                .map_err(|e| token_request_failed(&endpoint, e))?;
            decode_token(&endpoint, response)
        })
    }
}

// ---------------------------------------------------------------------------
// Managed identity
// ---------------------------------------------------------------------------

/// Tokens from the instance metadata service.
pub struct ManagedIdentityCredential {
    /// Client id of a user-assigned identity; `None` for system-assigned.
    client_id: Option<String>,
    endpoint: String,
    agent: ureq::Agent,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            client_id,
            endpoint: DEFAULT_IMDS_ENDPOINT.to_owned(),
            agent: ureq::AgentBuilder::new().timeout(TOKEN_TIMEOUT).build(),
            cache: TokenCache::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl TokenSource for ManagedIdentityCredential {
    fn token(&self, scope: &str) -> Result<String, ServiceError> {
        self.cache.get_or_fetch(scope, || {
            let resource = scope.trim_end_matches("/.default");
            let mut request = self
                .agent
                .get(&self.endpoint)
                .query("api-version", IMDS_API_VERSION)
                .query("resource", resource)
                .set("Metadata", "true");
            if let Some(client_id) = &self.client_id {
                request = request.query("client_id", client_id);
            }
            let response = request
                .call()
                .map_err(|e| token_request_failed(&self.endpoint, e))?;
            decode_token(&self.endpoint, response)
        })
    }
}
