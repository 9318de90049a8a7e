//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures infrastructure errors to
//! Sentry before responding to the client. Internal details never reach the
//! response body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cyberbiz_mcp_core::TenantIdentity;
use serde_json::json;
use thiserror::Error;

use crate::auth::IntrospectionError;
use crate::search::SearchError;
use crate::services::BigQueryError;
use crate::tenant::TenantContextError;

/// Application-level error type for HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Token introspection could not be performed.
    #[error("Introspection error: {0}")]
    Introspection(#[from] IntrospectionError),

    /// Tenant context read outside a bound request.
    #[error("Tenant context error: {0}")]
    TenantContext(#[from] TenantContextError),

    /// Product discovery failed.
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Introspection(IntrospectionError::InvalidClientCredentials)
            | Self::TenantContext(_)
            | Self::Search(SearchError::Analytics(BigQueryError::TenantContext(_)))
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Search(SearchError::InvalidQuery(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Introspection(_) | Self::Search(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Whether the error indicates a fault on our side or upstream.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        !matches!(
            self,
            Self::BadRequest(_) | Self::NotFound(_) | Self::Search(SearchError::InvalidQuery(_))
        )
    }

    /// Message safe to show to clients.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Introspection(IntrospectionError::InvalidClientCredentials) => {
                "Authorization server rejected this service's credentials".to_string()
            }
            Self::Introspection(_) => "Authorization server unavailable".to_string(),
            Self::TenantContext(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Search(SearchError::InvalidQuery(e)) => e.to_string(),
            Self::Search(SearchError::Analytics(BigQueryError::TenantContext(_))) => {
                "Internal server error".to_string()
            }
            Self::Search(_) => "External service error".to_string(),
            Self::BadRequest(_) | Self::NotFound(_) => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "error_description": self.public_message(),
        });

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Tag the Sentry scope with the tenant of the current request.
pub fn set_sentry_tenant(identity: &TenantIdentity) {
    sentry::configure_scope(|scope| {
        scope.set_tag("shop_id", identity.shop_id());
        scope.set_tag("shop_domain", identity.shop_domain());
    });
}
