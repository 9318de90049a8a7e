//! Application state shared across handlers.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::{CatalogCredential, IntrospectionError, TokenIntrospector, TokenVerifier};
use crate::config::{AuthMode, ServerConfig};
use crate::mcp::transport::SseSessions;
use crate::search::ProductSearchEngine;
use crate::services::gcp_auth::GCP_HTTP_TIMEOUT;
use crate::services::{
    BigQueryRestExecutor, CatalogClient, CatalogError, EmbeddingService, GcpTokenSource,
    QueryExecutor, TenantQueryClient, VertexEmbeddingClient,
};
use crate::tools::ToolRegistry;

/// Error creating the application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to build introspection client: {0}")]
    Introspection(#[from] IntrospectionError),
    #[error("failed to build catalog client: {0}")]
    Catalog(#[from] CatalogError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token mode requires introspection settings")]
    MissingIntrospection,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It holds only immutable
/// configuration and process-wide clients; nothing tenant-specific.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    verifier: Option<Arc<dyn TokenVerifier>>,
    catalog: CatalogClient,
    embeddings: Arc<dyn EmbeddingService>,
    analytics: TenantQueryClient,
    sessions: SseSessions,
    tools: ToolRegistry,
}

impl AppState {
    /// Create the state with the real Google Cloud and Cyberbiz clients.
    ///
    /// # Errors
    ///
    /// Returns an error if any HTTP client cannot be built.
    pub fn new(config: ServerConfig) -> Result<Self, StateError> {
        let verifier: Option<Arc<dyn TokenVerifier>> = match config.auth_mode {
            AuthMode::Token => {
                let introspection = config
                    .introspection
                    .as_ref()
                    .ok_or(StateError::MissingIntrospection)?;
                Some(Arc::new(TokenIntrospector::new(introspection)?))
            }
            AuthMode::Headers => None,
        };

        let http = reqwest::Client::builder()
            .connect_timeout(GCP_HTTP_TIMEOUT)
            .timeout(GCP_HTTP_TIMEOUT)
            .build()?;
        let tokens = Arc::new(GcpTokenSource::new(
            http.clone(),
            config.gcp.access_token.clone(),
        ));
        let embeddings = Arc::new(VertexEmbeddingClient::new(
            http.clone(),
            Arc::clone(&tokens),
            &config.gcp,
        ));
        let executor = Arc::new(BigQueryRestExecutor::new(
            http,
            tokens,
            config.gcp.project_id.clone(),
        ));

        Self::from_parts(config, verifier, embeddings, executor)
    }

    /// Create the state from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog client cannot be built.
    pub fn from_parts(
        config: ServerConfig,
        verifier: Option<Arc<dyn TokenVerifier>>,
        embeddings: Arc<dyn EmbeddingService>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self, StateError> {
        if config.auth_mode == AuthMode::Token && verifier.is_none() {
            return Err(StateError::MissingIntrospection);
        }

        let catalog = CatalogClient::new(&config.catalog)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                verifier,
                catalog,
                embeddings,
                analytics: TenantQueryClient::new(executor),
                sessions: SseSessions::default(),
                tools: ToolRegistry::standard(),
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Token verifier; present only in token mode.
    #[must_use]
    pub fn verifier(&self) -> Option<&Arc<dyn TokenVerifier>> {
        self.inner.verifier.as_ref()
    }

    /// Open SSE sessions.
    #[must_use]
    pub fn sessions(&self) -> &SseSessions {
        &self.inner.sessions
    }

    /// Registered MCP tools.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    /// Search engine bound to the current request's catalog credential.
    #[must_use]
    pub fn search_engine(&self, credential: &CatalogCredential) -> ProductSearchEngine {
        ProductSearchEngine::new(
            Arc::new(self.inner.catalog.session(credential.0.clone())),
            Arc::clone(&self.inner.embeddings),
            self.inner.analytics.clone(),
            self.inner.config.gcp.embedding_table.clone(),
        )
    }
}
