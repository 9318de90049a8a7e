//! Cyberbiz catalog REST API client.
//!
//! The HTTP pool is shared process-wide; each request gets a
//! [`CatalogSession`] that pairs the pool with the bearer credential the
//! request is allowed to use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cyberbiz_mcp_core::{
    Product, ProductDescription, ProductId, ProductOption, ProductVariant, ProductVariantPhoto,
    SearchQuery, VariantId,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use super::CatalogError;
use crate::config::CatalogConfig;

/// Connect/read timeout for catalog calls.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Read access to a tenant's catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// One page of the catalog listing, filtered by `query`.
    async fn list_products(&self, query: &SearchQuery) -> Result<Vec<Product>, CatalogError>;

    /// Full detail of one product.
    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError>;
}

/// Shared catalog HTTP client.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    /// Create a client for the configured API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CATALOG_TIMEOUT)
            .timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(CatalogError::Transport)?;

        Ok(Self {
            inner: Arc::new(CatalogClientInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
            }),
        })
    }

    /// Bind a bearer credential for the duration of one request.
    #[must_use]
    pub fn session(&self, credential: SecretString) -> CatalogSession {
        CatalogSession {
            client: self.clone(),
            credential,
        }
    }
}

/// A catalog client bound to one request's credential.
#[derive(Clone)]
pub struct CatalogSession {
    client: CatalogClient,
    credential: SecretString,
}

impl CatalogSession {
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}{path}", self.client.inner.base_url);
        tracing::info!(method = "GET", url = %url, "Catalog API request");

        let response = self
            .client
            .inner
            .client
            .get(&url)
            .bearer_auth(self.credential.expose_secret())
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    method = "GET",
                    url = %url,
                    error = %e,
                    "Catalog API request failed"
                );
                CatalogError::Transport(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(CatalogError::Transport)?;

        if !status.is_success() {
            tracing::error!(
                method = "GET",
                url = %url,
                status = %status,
                body = %body.chars().take(200).collect::<String>(),
                "Catalog API HTTP error"
            );
            return Err(CatalogError::Http {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(status = %status, bytes = body.len(), "Catalog API response");

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                method = "GET",
                url = %url,
                error = %e,
                "Catalog API returned invalid JSON"
            );
            CatalogError::Parse(e)
        })
    }
}

/// Query-string pairs for a listing; unset filters are omitted.
fn listing_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    let text = query.text.trim();
    if !text.is_empty() {
        params.push(("q", text.to_string()));
    }
    params.push(("page", query.page.to_string()));
    params.push(("per_page", query.limit.to_string()));
    if let Some(store_type) = query.store_type {
        params.push(("store_type", store_type.as_str().to_string()));
    }
    if let Some(genre) = query.genre {
        params.push(("genre", genre.as_str().to_string()));
    }
    if let Some(min) = query.price.min {
        params.push(("min_price", min.to_string()));
    }
    if let Some(max) = query.price.max {
        params.push(("max_price", max.to_string()));
    }
    params.push(("sort_by", query.effective_sort().as_str().to_string()));
    params
}

#[async_trait]
impl CatalogSource for CatalogSession {
    #[instrument(skip(self, query), fields(page = query.page, per_page = query.limit))]
    async fn list_products(&self, query: &SearchQuery) -> Result<Vec<Product>, CatalogError> {
        let body: ListingBody = self.get_json("/products", &listing_params(query)).await?;
        Ok(body.into_items().into_iter().map(Product::from).collect())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let raw: CatalogProduct = self.get_json(&format!("/products/{id}"), &[]).await?;
        Ok(raw.into())
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingBody {
    Items(Vec<CatalogProduct>),
    Wrapped { products: Vec<CatalogProduct> },
}

impl ListingBody {
    fn into_items(self) -> Vec<CatalogProduct> {
        match self {
            Self::Items(items) | Self::Wrapped { products: items } => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogProduct {
    id: i64,
    title: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    photo_urls: Option<Vec<String>>,
    #[serde(default)]
    brief: Option<String>,
    #[serde(default)]
    slogan: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    temperature_types: Option<Vec<String>>,
    #[serde(default)]
    product_type: Option<String>,
    #[serde(default)]
    store_type: Option<Value>,
    #[serde(default)]
    genre: Option<Value>,
    #[serde(default)]
    product_url: Option<String>,
    #[serde(default)]
    descriptions: Option<Vec<ProductDescription>>,
    #[serde(default)]
    options: Option<Vec<ProductOption>>,
    #[serde(default, alias = "variants")]
    product_variants: Option<Vec<CatalogVariant>>,
}

#[derive(Debug, Deserialize)]
struct CatalogVariant {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    price: f64,
    #[serde(default)]
    compare_at_price: Option<f64>,
    #[serde(default)]
    max_usable_bonus: Option<i64>,
    #[serde(default)]
    inventory_availability: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    inventory_quantity: Option<i64>,
    #[serde(default)]
    featured_image: Option<Value>,
    #[serde(default)]
    photo_urls: Option<Vec<ProductVariantPhoto>>,
}

fn non_empty<T>(items: Option<Vec<T>>) -> Option<Vec<T>> {
    items.filter(|v| !v.is_empty())
}

fn label(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl From<CatalogVariant> for ProductVariant {
    fn from(raw: CatalogVariant) -> Self {
        Self {
            id: VariantId::new(raw.id),
            title: raw
                .name
                .clone()
                .or(raw.title)
                .unwrap_or_default(),
            name: raw.name,
            options: non_empty(raw.options),
            price: raw.price,
            compare_at_price: raw.compare_at_price,
            max_usable_bonus: raw.max_usable_bonus,
            inventory_availability: raw.inventory_availability,
            weight: raw.weight,
            quantity: raw.inventory_quantity,
            featured_image: raw.featured_image.filter(|v| !v.is_null()),
            photo_urls: non_empty(raw.photo_urls),
        }
    }
}

impl From<CatalogProduct> for Product {
    fn from(raw: CatalogProduct) -> Self {
        Self {
            id: ProductId::new(raw.id),
            title: raw.title,
            handle: raw.handle,
            price: raw.price,
            photo_urls: non_empty(raw.photo_urls),
            brief: raw.brief,
            slogan: raw.slogan,
            vendor: raw.vendor,
            channel: raw.channel,
            temperature_types: non_empty(raw.temperature_types),
            product_type: raw.product_type,
            store_type: label(raw.store_type),
            genre: label(raw.genre),
            product_url: raw.product_url,
            descriptions: non_empty(raw.descriptions),
            options: non_empty(raw.options),
            variants: raw
                .product_variants
                .unwrap_or_default()
                .into_iter()
                .map(ProductVariant::from)
                .collect(),
        }
    }
}
