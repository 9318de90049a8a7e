//! Clients for the external systems product discovery depends on.
//!
//! - `catalog` - Cyberbiz catalog REST API
//! - `bigquery` - Tenant-scoped analytical queries
//! - `embedding` - Vertex AI query embeddings
//! - `gcp_auth` - Google Cloud access tokens shared by the two above

pub mod bigquery;
pub mod catalog;
pub mod embedding;
pub mod gcp_auth;

use thiserror::Error;

pub use bigquery::{
    BigQueryError, BigQueryRestExecutor, QueryExecutor, QueryParam, QueryParams, Row,
    TenantQueryClient,
};
pub use catalog::{CatalogClient, CatalogSession, CatalogSource};
pub use embedding::{EmbeddingService, VertexEmbeddingClient};
pub use gcp_auth::GcpTokenSource;

/// Failure to obtain a Google Cloud access token.
#[derive(Debug, Error)]
pub enum GcpAuthError {
    /// Metadata server request failed.
    #[error("Metadata server request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Metadata server answered with an error status.
    #[error("Metadata server returned HTTP {status}")]
    Metadata { status: u16 },
}

/// Failure to embed query text.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Could not obtain an access token.
    #[error("GCP auth error: {0}")]
    Auth(#[from] GcpAuthError),

    /// Network or decode failure.
    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with an error status.
    #[error("Embedding API HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider returned no embedding values.
    #[error("No embeddings returned")]
    EmptyResult,
}

/// Failure of a catalog API call.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Non-2xx response.
    #[error("Catalog API HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network or timeout failure.
    #[error("Catalog API request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Response body was not the expected JSON.
    #[error("Catalog API returned invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
