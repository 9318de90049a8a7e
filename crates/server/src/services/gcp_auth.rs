//! Google Cloud access tokens for Vertex AI and `BigQuery`.
//!
//! A statically configured token (`GOOGLE_ACCESS_TOKEN`, for local
//! development) wins; otherwise tokens come from the GCE/Cloud Run metadata
//! server and are cached until shortly before they expire.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::instrument;

use super::GcpAuthError;

/// Metadata server token endpoint for the default service account.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Connect/read timeout for Google Cloud API calls.
pub const GCP_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds how long a metadata refresh holds the cache lock.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Refresh cached tokens this many seconds before they expire.
const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: SecretString,
    expires_at: i64,
}

impl CachedToken {
    fn expires_within(&self, secs: i64) -> bool {
        chrono::Utc::now().timestamp() + secs >= self.expires_at
    }
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Source of OAuth access tokens for Google Cloud APIs.
pub struct GcpTokenSource {
    client: reqwest::Client,
    static_token: Option<SecretString>,
    metadata_url: String,
    metadata_timeout: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl GcpTokenSource {
    /// Create a token source.
    ///
    /// When `static_token` is set the metadata server is never contacted.
    #[must_use]
    pub fn new(client: reqwest::Client, static_token: Option<SecretString>) -> Self {
        Self {
            client,
            static_token,
            metadata_url: METADATA_TOKEN_URL.to_string(),
            metadata_timeout: METADATA_TIMEOUT,
            cached: RwLock::new(None),
        }
    }

    /// Override the metadata endpoint.
    #[must_use]
    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    /// Override the metadata request timeout.
    #[must_use]
    pub const fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Get a valid access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata server cannot be reached or answers
    /// with something other than a token.
    pub async fn access_token(&self) -> Result<SecretString, GcpAuthError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        if let Some(token) = Self::fresh(self.cached.read().await.as_ref()) {
            return Ok(token);
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = Self::fresh(cached.as_ref()) {
            return Ok(token);
        }

        let token = self.fetch_metadata_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    fn fresh(cached: Option<&CachedToken>) -> Option<SecretString> {
        cached
            .filter(|t| !t.expires_within(EXPIRY_MARGIN_SECS))
            .map(|t| t.access_token.clone())
    }

    #[instrument(skip(self))]
    async fn fetch_metadata_token(&self) -> Result<CachedToken, GcpAuthError> {
        let now = chrono::Utc::now().timestamp();

        let response = self
            .client
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .timeout(self.metadata_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Metadata server token request failed"
            );
            return Err(GcpAuthError::Metadata {
                status: status.as_u16(),
            });
        }

        let body: MetadataTokenResponse = response.json().await?;
        tracing::debug!(expires_in = body.expires_in, "Fetched GCP access token");

        Ok(CachedToken {
            access_token: SecretString::from(body.access_token),
            expires_at: now + body.expires_in,
        })
    }
}

impl std::fmt::Debug for GcpTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpTokenSource")
            .field(
                "static_token",
                &self.static_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("metadata_url", &self.metadata_url)
            .finish_non_exhaustive()
    }
}

/// Expose a token for use in an `Authorization` header.
pub(crate) fn bearer(token: &SecretString) -> &str {
    token.expose_secret()
}
