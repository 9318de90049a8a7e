//! Nearest-neighbor SQL for the product embedding table.

use cyberbiz_mcp_core::SearchQuery;

use crate::services::QueryParams;

/// Minimum cosine similarity for a candidate to count as a match.
pub const SIMILARITY_THRESHOLD: f64 = 0.2;

/// Build the `VECTOR_SEARCH` statement and its parameters.
///
/// The tenant restriction (`shop_id = @shop_id`) is always present in the
/// base table subquery; `@shop_id` itself is bound by the query client.
/// Optional filters from `query` are ANDed into the same subquery so they
/// narrow the candidate set before `top_k` is applied.
pub fn similarity_query(
    table: &str,
    query: &SearchQuery,
    embedding: Vec<f32>,
) -> (String, QueryParams) {
    let mut params = QueryParams::new()
        .with("embedding", embedding)
        .with("limit", query.limit)
        .with("threshold", SIMILARITY_THRESHOLD);

    let mut filters = String::new();
    if let Some(min) = query.price.min {
        filters.push_str("\n          AND price >= @min_price");
        params.insert("min_price", min);
    }
    if let Some(max) = query.price.max {
        filters.push_str("\n          AND price <= @max_price");
        params.insert("max_price", max);
    }
    if let Some(store_type) = query.store_type {
        filters.push_str("\n          AND store_type = @store_type");
        params.insert("store_type", store_type.code());
    }
    if let Some(genre) = query.genre {
        filters.push_str("\n          AND genre = @genre");
        params.insert("genre", genre.code());
    }

    let sql = format!(
        r"SELECT
      base.id AS product_id,
      distance,
      (1 - distance) AS similarity_score
    FROM VECTOR_SEARCH(
      (
        SELECT id, shop_id, content, ml_generate_embedding_result
        FROM `{table}`
        WHERE shop_id = @shop_id{filters}
      ),
      'ml_generate_embedding_result',
      (SELECT @embedding AS query_vector),
      top_k => @limit,
      distance_type => 'COSINE'
    )
    WHERE (1 - distance) >= @threshold
    ORDER BY similarity_score DESC"
    );

    (sql, params)
}

#[cfg(test)]
mod tests {
    use cyberbiz_mcp_core::{Genre, StoreType};

    use super::*;
    use crate::services::QueryParam;

    const TABLE: &str = "proj.cyberbiz_embedding_gemini.product_embeddings";

    #[test]
    fn test_base_query_is_tenant_scoped() {
        let (sql, params) = similarity_query(TABLE, &SearchQuery::vector("tea"), vec![0.5]);

        assert!(sql.contains("FROM `proj.cyberbiz_embedding_gemini.product_embeddings`"));
        assert!(sql.contains("WHERE shop_id = @shop_id"));
        assert!(sql.contains("distance_type => 'COSINE'"));
        assert!(sql.contains("top_k => @limit"));
        assert!(sql.contains("WHERE (1 - distance) >= @threshold"));
        assert!(sql.contains("ORDER BY similarity_score DESC"));
        assert!(!sql.contains("@min_price"));

        assert_eq!(params.get("limit"), Some(&QueryParam::Int(10)));
        assert_eq!(params.get("threshold"), Some(&QueryParam::Float(0.2)));
        assert_eq!(params.get("embedding"), Some(&QueryParam::FloatArray(vec![0.5])));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_filters_pushed_into_base_query() {
        let query = SearchQuery::vector("tea")
            .with_limit(5)
            .with_price(Some(100.0), Some(300.0))
            .with_store_type(StoreType::BranchStore)
            .with_genre(Genre::Eticket);
        let (sql, params) = similarity_query(TABLE, &query, vec![0.1]);

        let base_end = sql.find("'ml_generate_embedding_result',").unwrap_or_default();
        let base = &sql[..base_end];
        for clause in [
            "AND price >= @min_price",
            "AND price <= @max_price",
            "AND store_type = @store_type",
            "AND genre = @genre",
        ] {
            assert!(base.contains(clause), "missing {clause}");
        }

        assert_eq!(params.get("min_price"), Some(&QueryParam::Float(100.0)));
        assert_eq!(params.get("max_price"), Some(&QueryParam::Float(300.0)));
        assert_eq!(params.get("store_type"), Some(&QueryParam::Int(3)));
        assert_eq!(params.get("genre"), Some(&QueryParam::Int(2)));
        assert_eq!(params.get("limit"), Some(&QueryParam::Int(5)));
    }

    #[test]
    fn test_caller_never_binds_shop_id() {
        let (_, params) = similarity_query(TABLE, &SearchQuery::vector("tea"), vec![]);
        assert!(params.get("shop_id").is_none());
    }
}
