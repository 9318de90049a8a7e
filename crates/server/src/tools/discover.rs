//! `discover_products`: keyword or semantic product discovery.

use async_trait::async_trait;
use cyberbiz_mcp_core::{
    DEFAULT_LIMIT, Genre, MAX_LIMIT, SearchMode, SearchQuery, SortKey, StoreType,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolError, parse_args};

#[derive(Debug, Default, Deserialize)]
struct DiscoverArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default, alias = "max_results")]
    limit: Option<u32>,
    #[serde(default)]
    min_price: Option<f64>,
    #[serde(default)]
    max_price: Option<f64>,
    #[serde(default)]
    store_type: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    sort_by: Option<String>,
}

fn parse_mode(raw: Option<&str>) -> Result<SearchMode, ToolError> {
    match raw.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
        None | Some("keyword") => Ok(SearchMode::Keyword),
        Some("vector") => Ok(SearchMode::Vector),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "unknown mode '{other}', expected one of: keyword, vector"
        ))),
    }
}

fn invalid(e: impl ToString) -> ToolError {
    ToolError::InvalidArguments(e.to_string())
}

impl DiscoverArgs {
    fn into_query(self) -> Result<SearchQuery, ToolError> {
        let mut query = match parse_mode(self.mode.as_deref())? {
            SearchMode::Keyword => SearchQuery::keyword(self.query),
            SearchMode::Vector => SearchQuery::vector(self.query),
        }
        .with_page(self.page.unwrap_or(1))
        .with_limit(self.limit.unwrap_or(DEFAULT_LIMIT))
        .with_price(self.min_price, self.max_price);

        if let Some(raw) = self.store_type {
            query = query.with_store_type(raw.parse::<StoreType>().map_err(invalid)?);
        }
        if let Some(raw) = self.genre {
            query = query.with_genre(raw.parse::<Genre>().map_err(invalid)?);
        }
        if let Some(raw) = self.sort_by {
            query = query.with_sort(raw.parse::<SortKey>().map_err(invalid)?);
        }
        Ok(query)
    }
}

pub struct DiscoverProducts;

#[async_trait]
impl Tool for DiscoverProducts {
    fn name(&self) -> &'static str {
        "discover_products"
    }

    fn description(&self) -> &'static str {
        "Search and discover products in the current shop. Use mode \"keyword\" for a filtered \
         catalog listing or \"vector\" for semantic search that returns the closest matches \
         first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search text. Required for vector mode."
                },
                "mode": {
                    "type": "string",
                    "enum": ["keyword", "vector"],
                    "default": "keyword"
                },
                "page": { "type": "integer", "minimum": 1, "default": 1 },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "default": DEFAULT_LIMIT
                },
                "min_price": { "type": "number", "minimum": 0 },
                "max_price": { "type": "number", "minimum": 0 },
                "store_type": {
                    "type": "string",
                    "enum": ["shop", "pos_shop", "branch_store"]
                },
                "genre": {
                    "type": "string",
                    "enum": ["normal", "eticket", "combo"]
                },
                "sort_by": {
                    "type": "string",
                    "enum": [
                        "sold_at_desc",
                        "created_at_desc",
                        "price_asc",
                        "price_desc",
                        "sales_desc"
                    ],
                    "default": "sold_at_desc"
                }
            }
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let query = parse_args::<DiscoverArgs>(args)?.into_query()?;
        let products = ctx.search_engine().search(&query).await?;

        Ok(json!({
            "status": "success",
            "mode": query.mode,
            "query": query.text,
            "total_results": products.len(),
            "products": products,
        }))
    }
}
