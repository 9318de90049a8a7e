//! OAuth 2.0 token introspection (RFC 7662) against the Cyberbiz authority.
//!
//! The server authenticates itself to the introspection endpoint with HTTP
//! Basic auth using its own registered client credentials; the bearer token
//! presented by the agent is only sent in the form body.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cyberbiz_mcp_core::{TenantIdentity, TenantIdentityError};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;

use super::IntrospectionError;
use crate::config::IntrospectionConfig;

/// Fixed connect/read timeout for introspection calls.
const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// A bearer token the authority confirmed as active.
///
/// Produced per request and dropped with it; never persisted.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// The credential as presented (forwarded to the catalog API).
    pub raw_token: SecretString,
    /// OAuth client the token was issued to.
    pub client_id: String,
    /// Granted scopes.
    pub scopes: BTreeSet<String>,
    /// Expiry, when the authority reports one.
    pub expires_at: Option<DateTime<Utc>>,
    /// Remaining claims (`shop_id`, `shop_domain`, `exp`, ...).
    pub claims: Map<String, Value>,
}

impl VerifiedToken {
    /// Whether the token grants `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Scopes from `required` that the token lacks.
    #[must_use]
    pub fn missing_scopes<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|s| !self.has_scope(s))
            .map(String::as_str)
            .collect()
    }

    /// Derive the tenant from the `shop_id` / `shop_domain` claims.
    ///
    /// `shop_id` may arrive as a JSON number or a numeric string.
    ///
    /// # Errors
    ///
    /// Returns an error if either claim is missing or malformed.
    pub fn tenant_identity(&self) -> Result<TenantIdentity, TenantIdentityError> {
        let shop_id = match self.claims.get("shop_id") {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| TenantIdentityError::InvalidShopId(n.to_string()))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| TenantIdentityError::InvalidShopId(s.clone()))?,
            _ => return Err(TenantIdentityError::MissingClaim("shop_id")),
        };
        let shop_domain = self
            .claims
            .get("shop_domain")
            .and_then(Value::as_str)
            .ok_or(TenantIdentityError::MissingClaim("shop_domain"))?;

        TenantIdentity::new(shop_id, shop_domain)
    }
}

/// Verifies bearer credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`.
    ///
    /// Returns `Ok(None)` when the authority reports the token inactive or it
    /// has expired; errors are reserved for failures of the verification
    /// itself.
    async fn verify(&self, token: &str) -> Result<Option<VerifiedToken>, IntrospectionError>;
}

/// Introspection response body.
#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    exp: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Remote token introspector.
#[derive(Clone)]
pub struct TokenIntrospector {
    client: reqwest::Client,
    introspection_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl TokenIntrospector {
    /// Create an introspector from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &IntrospectionConfig) -> Result<Self, IntrospectionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(INTROSPECTION_TIMEOUT)
            .timeout(INTROSPECTION_TIMEOUT)
            .build()
            .map_err(IntrospectionError::Transport)?;

        Ok(Self {
            client,
            introspection_url: config.introspection_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn into_verified(token: &str, body: IntrospectionResponse) -> Option<VerifiedToken> {
        if !body.active {
            return None;
        }

        let exp = body.exp.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| {
                #[allow(clippy::cast_possible_truncation)] // epoch seconds fit in i64
                n.as_f64().map(|f| f as i64)
            }),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        });
        let expires_at = exp.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            tracing::debug!("Introspection reported active token past its exp");
            return None;
        }

        let scopes = body
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(String::from)
            .collect();

        let mut claims = body.extra;
        if let Some(exp) = body.exp {
            claims.insert("exp".to_string(), exp);
        }

        Some(VerifiedToken {
            raw_token: SecretString::from(token.to_string()),
            client_id: body.client_id.unwrap_or_default(),
            scopes,
            expires_at,
            claims,
        })
    }
}

#[async_trait]
impl TokenVerifier for TokenIntrospector {
    #[instrument(skip(self, token), fields(url = %self.introspection_url))]
    async fn verify(&self, token: &str) -> Result<Option<VerifiedToken>, IntrospectionError> {
        let response = self
            .client
            .post(&self.introspection_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(IntrospectionError::Transport)?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::error!("Introspection endpoint rejected this server's client credentials");
            return Err(IntrospectionError::InvalidClientCredentials);
        }

        let body = response
            .text()
            .await
            .map_err(IntrospectionError::Transport)?;

        if status != reqwest::StatusCode::OK {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Introspection failed"
            );
            return Err(IntrospectionError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IntrospectionResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse introspection response"
            );
            IntrospectionError::MalformedResponse(e.to_string())
        })?;

        let verified = Self::into_verified(token, parsed);
        tracing::debug!(active = verified.is_some(), "Token introspected");
        Ok(verified)
    }
}
