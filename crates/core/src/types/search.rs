//! Product discovery queries and intermediate vector-search candidates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::{Genre, SortKey, StoreType};
use super::id::ProductId;

/// Results returned when the caller does not ask for a page size.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size accepted from callers.
pub const MAX_LIMIT: u32 = 50;

/// Query validation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchQueryError {
    #[error("query text is required for vector search")]
    EmptyText,
    #[error("page must be at least 1")]
    InvalidPage,
    #[error("limit must be between 1 and {MAX_LIMIT} (got {0})")]
    InvalidLimit(u32),
    #[error("price bounds must be non-negative")]
    NegativePrice,
    #[error("min_price ({min}) is greater than max_price ({max})")]
    InvertedPriceRange { min: f64, max: f64 },
}

/// Discovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Direct catalog listing filtered by keyword.
    #[default]
    Keyword,
    /// Embedding nearest-neighbor search.
    Vector,
}

/// Optional inclusive price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PriceRange {
    /// Whether neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    fn validate(&self) -> Result<(), SearchQueryError> {
        if self.min.is_some_and(|v| v < 0.0) || self.max.is_some_and(|v| v < 0.0) {
            return Err(SearchQueryError::NegativePrice);
        }
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(SearchQueryError::InvertedPriceRange { min, max });
        }
        Ok(())
    }
}

/// A validated product discovery request.
///
/// Construct with [`SearchQuery::keyword`] or [`SearchQuery::vector`], refine
/// with the `with_*` methods, then call [`SearchQuery::validate`] before
/// dispatching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub mode: SearchMode,
    pub text: String,
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub price: PriceRange,
    #[serde(default)]
    pub store_type: Option<StoreType>,
    #[serde(default)]
    pub genre: Option<Genre>,
    #[serde(default)]
    pub sort: Option<SortKey>,
}

impl SearchQuery {
    fn new(mode: SearchMode, text: impl Into<String>) -> Self {
        Self {
            mode,
            text: text.into(),
            page: 1,
            limit: DEFAULT_LIMIT,
            price: PriceRange::default(),
            store_type: None,
            genre: None,
            sort: None,
        }
    }

    /// A keyword (catalog listing) query.
    #[must_use]
    pub fn keyword(text: impl Into<String>) -> Self {
        Self::new(SearchMode::Keyword, text)
    }

    /// A vector (semantic similarity) query.
    #[must_use]
    pub fn vector(text: impl Into<String>) -> Self {
        Self::new(SearchMode::Vector, text)
    }

    #[must_use]
    pub const fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_price(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.price = PriceRange { min, max };
        self
    }

    #[must_use]
    pub const fn with_store_type(mut self, store_type: StoreType) -> Self {
        self.store_type = Some(store_type);
        self
    }

    #[must_use]
    pub const fn with_genre(mut self, genre: Genre) -> Self {
        self.genre = Some(genre);
        self
    }

    #[must_use]
    pub const fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sort order to send, falling back to most-recently-sold.
    #[must_use]
    pub fn effective_sort(&self) -> SortKey {
        self.sort.unwrap_or_default()
    }

    /// Check the query before any downstream call is made.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), SearchQueryError> {
        if self.mode == SearchMode::Vector && self.text.trim().is_empty() {
            return Err(SearchQueryError::EmptyText);
        }
        if self.page == 0 {
            return Err(SearchQueryError::InvalidPage);
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(SearchQueryError::InvalidLimit(self.limit));
        }
        self.price.validate()
    }
}

/// A nearest-neighbor match awaiting detail enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub product_id: ProductId,
    pub similarity_score: f64,
}

impl CandidateMatch {
    /// Build a candidate from a cosine distance, `similarity = 1 - distance`.
    ///
    /// The score is clamped to `[0, 1]`.
    #[must_use]
    pub fn from_distance(product_id: ProductId, distance: f64) -> Self {
        Self {
            product_id,
            similarity_score: (1.0 - distance).clamp(0.0, 1.0),
        }
    }
}
