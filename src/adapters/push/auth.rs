use crate::adapters::push::PushError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::RwLock;

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_TTL_SECS: i64 = 3600;

/// Tokens are refreshed this long before the issuer says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

enum CredentialSource {
    ServiceAccount { key: ServiceAccountKey, signing_key: EncodingKey },
    MetadataServer { base_url: String },
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount { key, .. } => f.debug_tuple("ServiceAccount").field(key).finish(),
            Self::MetadataServer { base_url } => f.debug_tuple("MetadataServer").field(base_url).finish(),
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Supplies OAuth2 bearer tokens for the FCM API, caching them until shortly before expiry.
#[derive(Debug)]
pub struct TokenProvider {
    http: reqwest::Client,
    source: CredentialSource,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    /// Loads a service account key file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a usable RSA key.
    pub fn from_service_account_file(http: reqwest::Client, path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read credentials file {}: {e}", path.display()))?;
        let key: ServiceAccountKey = serde_json::from_slice(&raw)?;
        Self::from_service_account_key(http, key)
    }

    /// # Errors
    /// Returns an error if the private key is not a PEM encoded RSA key.
    pub fn from_service_account_key(http: reqwest::Client, key: ServiceAccountKey) -> anyhow::Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self { http, source: CredentialSource::ServiceAccount { key, signing_key }, cached: RwLock::new(None) })
    }

    /// Uses the GCE / Cloud Run metadata server. `host` may carry a port and, for tests, a scheme.
    #[must_use]
    pub fn from_metadata_server(http: reqwest::Client, host: &str) -> Self {
        Self {
            http,
            source: CredentialSource::MetadataServer { base_url: metadata_base_url(host) },
            cached: RwLock::new(None),
        }
    }

    /// The project id embedded in the credentials, if any.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        match &self.source {
            CredentialSource::ServiceAccount { key, .. } => key.project_id.as_deref(),
            CredentialSource::MetadataServer { .. } => None,
        }
    }

    /// Asks the metadata server which project this instance runs in.
    ///
    /// # Errors
    /// Returns an error when the provider is not backed by the metadata server or the lookup fails.
    pub async fn discover_project_id(&self) -> anyhow::Result<String> {
        let CredentialSource::MetadataServer { base_url } = &self.source else {
            anyhow::bail!("project id discovery requires the metadata server");
        };

        let response = self
            .http
            .get(format!("{base_url}/computeMetadata/v1/project/project-id"))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?;
        let project_id = response.text().await?.trim().to_string();
        if project_id.is_empty() {
            anyhow::bail!("metadata server returned an empty project id");
        }
        Ok(project_id)
    }

    /// Returns a valid access token, fetching a new one when the cached token is stale.
    ///
    /// # Errors
    /// Returns `PushError::Auth` if the token endpoint cannot be reached or refuses the request.
    pub async fn access_token(&self) -> Result<String, PushError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the write lock.
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let response = self.fetch().await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(expires_in = response.expires_in, "Obtained FCM access token");

        let value = response.access_token;
        *cached = Some(CachedToken { value: value.clone(), refresh_at: Instant::now() + lifetime });
        Ok(value)
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    async fn fetch(&self) -> Result<TokenResponse, PushError> {
        let request = match &self.source {
            CredentialSource::ServiceAccount { key, signing_key } => {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                let claims = AssertionClaims {
                    iss: &key.client_email,
                    scope: MESSAGING_SCOPE,
                    aud: &key.token_uri,
                    iat: now,
                    exp: now + ASSERTION_TTL_SECS,
                };
                let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, signing_key)
                    .map_err(|e| PushError::Auth(format!("failed to sign assertion: {e}")))?;

                self.http
                    .post(&key.token_uri)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(format!("grant_type={JWT_BEARER_GRANT}&assertion={assertion}"))
            }
            CredentialSource::MetadataServer { base_url } => self
                .http
                .get(format!("{base_url}/computeMetadata/v1/instance/service-accounts/default/token"))
                .header("Metadata-Flavor", "Google"),
        };

        let response = request.send().await.map_err(|e| PushError::Auth(format!("token request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Auth(format!("token endpoint returned {status}")));
        }

        response.json::<TokenResponse>().await.map_err(|e| PushError::Auth(format!("invalid token response: {e}")))
    }
}

fn metadata_base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
