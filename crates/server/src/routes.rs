//! HTTP routes.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                 - Liveness check
//! GET  /.well-known/oauth-protected-resource   - Resource metadata (token mode)
//!
//! # MCP (authenticated, tenant bound)
//! POST /mcp                                    - streamable-http transport
//! GET  /sse                                    - sse transport: event stream
//! POST /messages?session_id=<uuid>             - sse transport: client messages
//! ```
//!
//! Only the routes of the configured transport are mounted.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::config::{AuthMode, Transport};
use crate::mcp::transport::{self, MESSAGES_PATH};
use crate::middleware::{RESOURCE_METADATA_PATH, authenticate, request_id_middleware};
use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let mcp = match state.config().transport {
        Transport::StreamableHttp => {
            Router::new().route("/mcp", post(transport::streamable_http))
        }
        Transport::Sse => Router::new()
            .route("/sse", get(transport::sse_connect))
            .route(MESSAGES_PATH, post(transport::sse_message)),
    }
    .layer(axum::middleware::from_fn_with_state(
        state.clone(),
        authenticate,
    ));

    Router::new()
        .route("/health", get(health))
        .route(RESOURCE_METADATA_PATH, get(protected_resource_metadata))
        .merge(mcp)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        shop_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// OAuth 2.0 protected-resource metadata (RFC 9728).
///
/// Lets agents discover which authorization server issues tokens for this
/// resource. Header-mode deployments have none and answer 404.
async fn protected_resource_metadata(State(state): State<AppState>) -> Response {
    let config = state.config();
    match (config.auth_mode, config.introspection.as_ref()) {
        (AuthMode::Token, Some(introspection)) => Json(json!({
            "resource": config.server_url(),
            "authorization_servers": [introspection.auth_base_url],
            "scopes_supported": introspection.required_scopes,
            "bearer_methods_supported": ["header"],
        }))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
