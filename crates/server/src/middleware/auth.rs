//! Authentication gate.
//!
//! Exactly one of two gates runs per deployment:
//!
//! - **Token mode**: the `Authorization: Bearer` credential is introspected;
//!   the tenant comes from the token's `shop_id` / `shop_domain` claims.
//! - **Header mode**: an upstream gateway is trusted to have authenticated the
//!   caller and supplies `X-Shop-ID` / `X-Shop-Domain`.
//!
//! Either way the resolved identity is bound with [`tenant::scope`] around the
//! rest of the request, so every downstream call sees it and nothing else
//! can.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cyberbiz_mcp_core::{SHOP_DOMAIN_HEADER, SHOP_ID_HEADER, TenantIdentity, TenantIdentityError};
use serde_json::json;
use tracing::Span;

use crate::auth::{CatalogCredential, VerifiedToken};
use crate::config::AuthMode;
use crate::error::{AppError, set_sentry_tenant};
use crate::state::AppState;
use crate::tenant;

/// Path of the OAuth protected-resource metadata document.
pub const RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// A request the gate refuses to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No bearer credential was presented.
    AuthenticationRequired,
    /// The credential is inactive, expired, or carries no shop.
    InvalidToken(String),
    /// The credential lacks scopes this server requires.
    InsufficientScope(Vec<String>),
    /// Header mode: shop headers missing or malformed.
    InvalidShopHeaders(TenantIdentityError),
}

impl AuthRejection {
    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "authentication_required",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::InvalidShopHeaders(_) => "invalid_shop_headers",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired | Self::InvalidToken(_) | Self::InvalidShopHeaders(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
        }
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AuthenticationRequired => "Bearer token required".to_string(),
            Self::InvalidToken(reason) => reason.clone(),
            Self::InsufficientScope(missing) => {
                format!("Missing required scope(s): {}", missing.join(" "))
            }
            Self::InvalidShopHeaders(e) => e.to_string(),
        }
    }

    /// Response carrying an RFC 6750 challenge that points at the
    /// protected-resource metadata.
    #[must_use]
    pub fn with_challenge(self, server_url: &str) -> Response {
        let mut challenge = format!(
            "Bearer resource_metadata=\"{}{RESOURCE_METADATA_PATH}\"",
            server_url.trim_end_matches('/')
        );
        if !matches!(self, Self::AuthenticationRequired) {
            challenge.push_str(&format!(", error=\"{}\"", self.code()));
        }
        if let Self::InsufficientScope(missing) = &self {
            challenge.push_str(&format!(", scope=\"{}\"", missing.join(" ")));
        }

        let mut response = self.into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        tracing::info!(
            error = self.code(),
            description = %self.description(),
            "Request rejected by authentication gate"
        );
        let body = json!({
            "error": self.code(),
            "error_description": self.description(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Gate every request according to the configured auth mode.
pub async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.config().auth_mode {
        AuthMode::Token => require_bearer_token(state, request, next).await,
        AuthMode::Headers => require_shop_headers(state, request, next).await,
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn verify_bearer(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(VerifiedToken, TenantIdentity), Response> {
    let server_url = state.config().server_url();

    let Some(token) = bearer_token(headers) else {
        return Err(AuthRejection::AuthenticationRequired.with_challenge(&server_url));
    };

    let Some(verifier) = state.verifier() else {
        return Err(AppError::Internal("token verifier not configured".to_string()).into_response());
    };

    let verified = match verifier.verify(token).await {
        Ok(Some(verified)) => verified,
        Ok(None) => {
            return Err(AuthRejection::InvalidToken("Token is inactive or expired".to_string())
                .with_challenge(&server_url));
        }
        Err(e) => return Err(AppError::from(e).into_response()),
    };

    let required = state
        .config()
        .introspection
        .as_ref()
        .map(|c| c.required_scopes.as_slice())
        .unwrap_or_default();
    let missing = verified.missing_scopes(required);
    if !missing.is_empty() {
        let missing = missing.into_iter().map(String::from).collect();
        return Err(AuthRejection::InsufficientScope(missing).with_challenge(&server_url));
    }

    let identity = verified.tenant_identity().map_err(|e| {
        AuthRejection::InvalidToken(format!("Token carries no shop identity: {e}"))
            .with_challenge(&server_url)
    })?;

    Ok((verified, identity))
}

async fn require_bearer_token(state: AppState, mut request: Request, next: Next) -> Response {
    let (verified, identity) = match verify_bearer(&state, request.headers()).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    tracing::debug!(
        shop_id = %identity.shop_id(),
        client_id = %verified.client_id,
        "Bearer token accepted"
    );
    Span::current().record("shop_id", identity.shop_id().as_i64());
    set_sentry_tenant(&identity);

    request
        .extensions_mut()
        .insert(CatalogCredential(verified.raw_token.clone()));
    request.extensions_mut().insert(verified);

    tenant::scope(identity, next.run(request)).await
}

async fn require_shop_headers(state: AppState, mut request: Request, next: Next) -> Response {
    let identity = match TenantIdentity::from_headers(
        header_str(request.headers(), SHOP_ID_HEADER),
        header_str(request.headers(), SHOP_DOMAIN_HEADER),
    ) {
        Ok(identity) => identity,
        Err(e) => return AuthRejection::InvalidShopHeaders(e).into_response(),
    };

    let Some(service_token) = state.config().catalog.service_token.clone() else {
        return AppError::Internal("catalog service token not configured".to_string())
            .into_response();
    };

    Span::current().record("shop_id", identity.shop_id().as_i64());
    set_sentry_tenant(&identity);

    request
        .extensions_mut()
        .insert(CatalogCredential(service_token));

    tenant::scope(identity, next.run(request)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    use axum::body::Body;
    use axum::routing::get;
    use axum::{Extension, Router};
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::{Map, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{IntrospectionError, MockTokenVerifier, TokenVerifier};
    use crate::config::{Cli, ServerConfig};
    use crate::services::bigquery::MockQueryExecutor;
    use crate::services::embedding::MockEmbeddingService;

    fn config(mode: &str, scopes: &str) -> ServerConfig {
        let env: HashMap<&str, String> = HashMap::from([
            ("AUTH_MODE", mode.to_string()),
            ("CYBERBIZ_AUTH_PUBLIC_URL", "https://auth.cyberbiz.co".to_string()),
            ("MCP_SERVER_CLIENT_ID", "mcp-server".to_string()),
            (
                "MCP_SERVER_CLIENT_SECRET",
                "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6".to_string(),
            ),
            ("REQUIRED_SCOPES", scopes.to_string()),
            ("CYBERBIZ_API_BASE_URL", "http://127.0.0.1:1/v2".to_string()),
            ("CYBERBIZ_API_TOKEN", "service-token".to_string()),
            ("CYBERBIZ_GCP_PROJECT_ID", "proj".to_string()),
            ("PUBLIC_URL", "https://mcp.cyberbiz.co".to_string()),
        ]);
        let cli = <Cli as clap::Parser>::parse_from([
            "cyberbiz-mcp-server",
            "--transport",
            "streamable-http",
            "--host",
            "127.0.0.1",
            "--port",
            "8000",
        ]);
        ServerConfig::from_lookup(&cli, |k| env.get(k).cloned()).unwrap()
    }

    fn verified(scopes: &[&str], claims: Value) -> VerifiedToken {
        VerifiedToken {
            raw_token: SecretString::from("agent-token"),
            client_id: "agent".to_string(),
            scopes: scopes.iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>(),
            expires_at: None,
            claims: claims.as_object().cloned().unwrap_or_else(Map::new),
        }
    }

    fn app(config: ServerConfig, verifier: Option<Arc<dyn TokenVerifier>>) -> Router {
        let state = AppState::from_parts(
            config,
            verifier,
            Arc::new(MockEmbeddingService::new()),
            Arc::new(MockQueryExecutor::new()),
        )
        .unwrap();

        Router::new()
            .route(
                "/whoami",
                get(|Extension(credential): Extension<CatalogCredential>| async move {
                    let shop = tenant::current().unwrap();
                    format!(
                        "{}|{}|{}",
                        shop.shop_id(),
                        shop.shop_domain(),
                        credential.0.expose_secret()
                    )
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authenticate,
            ))
            .with_state(state)
    }

    fn token_app(
        result: fn() -> Result<Option<VerifiedToken>, IntrospectionError>,
        scopes: &str,
    ) -> Router {
        let mut verifier = MockTokenVerifier::new();
        verifier.expect_verify().returning(move |_| result());
        app(config("token", scopes), Some(Arc::new(verifier)))
    }

    async fn send(app: Router, headers: &[(&str, &str)]) -> (StatusCode, HeaderMap, String) {
        let mut builder = Request::builder().uri("/whoami");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn error_code(body: &str) -> String {
        let value: Value = serde_json::from_str(body).unwrap();
        value["error"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_token_challenged() {
        let app = token_app(|| Ok(None), "");
        let (status, headers, body) = send(app, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "authentication_required");
        let challenge = headers[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.contains(
            "resource_metadata=\"https://mcp.cyberbiz.co/.well-known/oauth-protected-resource\""
        ));
    }

    #[tokio::test]
    async fn test_inactive_token_rejected() {
        let app = token_app(|| Ok(None), "");
        let (status, _, body) = send(app, &[("authorization", "Bearer stale")]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "invalid_token");
    }

    #[tokio::test]
    async fn test_active_token_binds_tenant() {
        let app = token_app(
            || {
                Ok(Some(verified(
                    &["read_products"],
                    serde_json::json!({"shop_id": 146, "shop_domain": "demo.cyberbiz.co"}),
                )))
            },
            "read_products",
        );
        let (status, _, body) = send(app, &[("authorization", "Bearer agent-token")]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "146|demo.cyberbiz.co|agent-token");
    }

    #[tokio::test]
    async fn test_missing_required_scope_forbidden() {
        let app = token_app(
            || {
                Ok(Some(verified(
                    &["read_products"],
                    serde_json::json!({"shop_id": 146, "shop_domain": "demo.cyberbiz.co"}),
                )))
            },
            "read_products read_orders",
        );
        let (status, headers, body) = send(app, &[("authorization", "Bearer t")]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&body), "insufficient_scope");
        assert!(
            headers[header::WWW_AUTHENTICATE]
                .to_str()
                .unwrap()
                .contains("scope=\"read_orders\"")
        );
    }

    #[tokio::test]
    async fn test_token_without_shop_claims_rejected() {
        let app = token_app(|| Ok(Some(verified(&[], serde_json::json!({})))), "");
        let (status, _, body) = send(app, &[("authorization", "Bearer t")]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "invalid_token");
    }

    #[tokio::test]
    async fn test_own_credentials_rejected_is_server_error() {
        let app = token_app(|| Err(IntrospectionError::InvalidClientCredentials), "");
        let (status, _, _) = send(app, &[("authorization", "Bearer t")]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_introspection_outage_is_bad_gateway() {
        let app = token_app(
            || {
                Err(IntrospectionError::Protocol {
                    status: 503,
                    body: "down".to_string(),
                })
            },
            "",
        );
        let (status, _, _) = send(app, &[("authorization", "Bearer t")]).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_header_mode_binds_tenant_with_service_token() {
        let app = app(config("headers", ""), None);
        let (status, _, body) = send(
            app,
            &[("x-shop-id", "42"), ("x-shop-domain", "tea.cyberbiz.co")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "42|tea.cyberbiz.co|service-token");
    }

    #[tokio::test]
    async fn test_header_mode_distinct_rejections() {
        let (status, _, missing_id) =
            send(app(config("headers", ""), None), &[("x-shop-domain", "a.co")]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, _, missing_domain) =
            send(app(config("headers", ""), None), &[("x-shop-id", "42")]).await;

        let (_, _, invalid) = send(
            app(config("headers", ""), None),
            &[("x-shop-id", "abc"), ("x-shop-domain", "a.co")],
        )
        .await;

        for body in [&missing_id, &missing_domain, &invalid] {
            assert_eq!(error_code(body), "invalid_shop_headers");
        }
        assert!(missing_id.contains("X-Shop-ID header is required"));
        assert!(missing_domain.contains("X-Shop-Domain header is required"));
        assert!(invalid.contains("Invalid X-Shop-ID: abc"));
    }
}
