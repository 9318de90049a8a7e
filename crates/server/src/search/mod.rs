//! Product discovery.
//!
//! Two strategies share one entry point:
//!
//! - **Keyword**: a single filtered call to the catalog listing.
//! - **Vector**: embed the query, find nearest neighbors in the tenant's slice
//!   of the embedding table, then fetch every candidate's detail concurrently
//!   and return them in similarity order.

pub mod sql;

use std::sync::Arc;

use cyberbiz_mcp_core::{
    CandidateMatch, Product, ProductId, SearchMode, SearchQuery, SearchQueryError,
};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::services::{
    BigQueryError, CatalogError, CatalogSource, EmbeddingError, EmbeddingService, Row,
    TenantQueryClient,
};
pub use sql::SIMILARITY_THRESHOLD;

/// Errors from product discovery.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search query: {0}")]
    InvalidQuery(#[from] SearchQueryError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Analytical query failed: {0}")]
    Analytics(#[from] BigQueryError),

    #[error("Catalog listing failed: {0}")]
    Catalog(#[from] CatalogError),

    /// A candidate's detail fetch failed; the whole batch is abandoned.
    #[error("Failed to fetch product {product_id}: {source}")]
    Enrichment {
        product_id: ProductId,
        #[source]
        source: CatalogError,
    },

    /// The similarity query returned a row without a usable id or distance.
    #[error("Malformed candidate row: {0}")]
    MalformedCandidate(String),
}

/// Orchestrates keyword and vector product search for one request.
#[derive(Clone)]
pub struct ProductSearchEngine {
    catalog: Arc<dyn CatalogSource>,
    embeddings: Arc<dyn EmbeddingService>,
    analytics: TenantQueryClient,
    embedding_table: String,
}

impl ProductSearchEngine {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        embeddings: Arc<dyn EmbeddingService>,
        analytics: TenantQueryClient,
        embedding_table: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            embeddings,
            analytics,
            embedding_table: embedding_table.into(),
        }
    }

    /// Run `query` with the strategy its mode selects.
    ///
    /// # Errors
    ///
    /// See [`Self::list_products`] and [`Self::search_by_similarity`].
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Product>, SearchError> {
        match query.mode {
            SearchMode::Keyword => self.list_products(query).await,
            SearchMode::Vector => self.search_by_similarity(query).await,
        }
    }

    /// Keyword mode: one page of the filtered catalog listing.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] before any call is made if the
    /// query is invalid, otherwise the catalog failure.
    #[instrument(skip(self, query), fields(page = query.page, limit = query.limit))]
    pub async fn list_products(&self, query: &SearchQuery) -> Result<Vec<Product>, SearchError> {
        query.validate()?;
        let products = self.catalog.list_products(query).await?;
        tracing::info!(count = products.len(), "Keyword search completed");
        Ok(products)
    }

    /// Vector mode: nearest neighbors by cosine similarity, enriched from the
    /// catalog and ordered by descending similarity.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the embedding, analytical or detail
    /// calls. An empty candidate set is not an error.
    #[instrument(skip(self, query), fields(limit = query.limit))]
    pub async fn search_by_similarity(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<Product>, SearchError> {
        query.validate()?;

        let candidates = self.find_candidates(query).await?;
        if candidates.is_empty() {
            tracing::info!("Vector search found no candidates above threshold");
            return Ok(Vec::new());
        }

        let products = self.enrich(&candidates).await?;
        tracing::info!(count = products.len(), "Vector search completed");
        Ok(products)
    }

    /// Nearest-neighbor candidates above the similarity threshold, best first.
    ///
    /// # Errors
    ///
    /// Returns the embedding or analytical failure, or
    /// [`SearchError::MalformedCandidate`] for an unreadable row.
    pub async fn find_candidates(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<CandidateMatch>, SearchError> {
        let embedding = self.embeddings.embed(&query.text).await?;
        let (sql, params) = sql::similarity_query(&self.embedding_table, query, embedding);
        let rows = self.analytics.query(&sql, params).await?;

        let mut candidates = rows
            .iter()
            .map(candidate_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        // The store applies the same threshold; rows that slip past it (e.g. a
        // float rounding at the boundary) are dropped here too.
        candidates.retain(|c| c.similarity_score >= SIMILARITY_THRESHOLD);
        candidates.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));

        tracing::debug!(count = candidates.len(), "Vector candidates");
        Ok(candidates)
    }

    /// Fetch every candidate's detail concurrently and reassemble in
    /// candidate order. The first failure aborts the rest.
    async fn enrich(&self, candidates: &[CandidateMatch]) -> Result<Vec<Product>, SearchError> {
        let mut slots: Vec<Option<Product>> = vec![None; candidates.len()];

        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let catalog = Arc::clone(&self.catalog);
                let product_id = candidate.product_id;
                async move { (index, product_id, catalog.get_product(product_id).await) }
            })
            .collect();

        while let Some((index, product_id, result)) = pending.next().await {
            let product =
                result.map_err(|source| SearchError::Enrichment { product_id, source })?;
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(product);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

fn candidate_from_row(row: &Row) -> Result<CandidateMatch, SearchError> {
    let product_id = match row.get("product_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SearchError::MalformedCandidate(format!("product_id in {row:?}")))?;

    let distance = row
        .get("distance")
        .and_then(Value::as_f64)
        .ok_or_else(|| SearchError::MalformedCandidate(format!("distance in {row:?}")))?;

    Ok(CandidateMatch::from_distance(
        ProductId::new(product_id),
        distance,
    ))
}
