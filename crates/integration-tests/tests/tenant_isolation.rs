//! Concurrent requests for different shops never see each other's data.

use std::sync::Arc;
use std::time::Duration;

use cyberbiz_mcp_integration_tests::{
    CatalogStub, RecordingExecutor, ServerSetup, StubEmbeddings, product_ids, shop_headers,
    tool_call,
};
use serde_json::{Value, json};

const SHOP_A: i64 = 7;
const SHOP_B: i64 = 8;

/// Each shop owns a disjoint id range: shop 7 gets 700.., shop 8 gets 800..
fn rows_for(shop_id: i64) -> Vec<(i64, f64)> {
    let base = shop_id * 100;
    vec![(base + 1, 0.1), (base + 2, 0.2)]
}

async fn discover(client: &reqwest::Client, base: &str, shop_id: i64, id: i64) -> Value {
    let mut request = client.post(format!("{base}/mcp")).json(&tool_call(
        id,
        "discover_products",
        json!({"query": "gift box", "mode": "vector"}),
    ));
    for (name, value) in shop_headers(shop_id) {
        request = request.header(name, value);
    }
    request.send().await.unwrap().json().await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_shops_stay_isolated() {
    let catalog = CatalogStub::new();
    let catalog_url = catalog.start().await;
    let executor = Arc::new(
        RecordingExecutor::new(rows_for).with_latency(Duration::from_millis(50)),
    );
    let base = ServerSetup::headers(catalog_url)
        .start(Arc::new(StubEmbeddings::default()), Arc::clone(&executor))
        .await;
    let client = reqwest::Client::new();

    let requests = (0..10_i64).map(|i| {
        let shop_id = if i % 2 == 0 { SHOP_A } else { SHOP_B };
        let client = client.clone();
        let base = base.clone();
        async move { (shop_id, discover(&client, &base, shop_id, i).await) }
    });
    let responses = futures::future::join_all(requests).await;

    for (shop_id, response) in responses {
        let ids = product_ids(&response);
        assert_eq!(ids.len(), 2, "shop {shop_id}: {response}");
        assert!(
            ids.iter().all(|id| id / 100 == shop_id),
            "shop {shop_id} saw {ids:?}"
        );
    }

    let bound: Vec<Option<i64>> = executor.queries().iter().map(|q| q.shop_id).collect();
    assert_eq!(bound.len(), 10);
    assert_eq!(bound.iter().filter(|s| **s == Some(SHOP_A)).count(), 5);
    assert_eq!(bound.iter().filter(|s| **s == Some(SHOP_B)).count(), 5);
}

#[tokio::test]
async fn test_caller_supplied_shop_id_is_ignored() {
    let catalog = CatalogStub::new();
    let catalog_url = catalog.start().await;
    let executor = Arc::new(RecordingExecutor::new(rows_for));
    let base = ServerSetup::headers(catalog_url)
        .start(Arc::new(StubEmbeddings::default()), Arc::clone(&executor))
        .await;

    let mut request = reqwest::Client::new().post(format!("{base}/mcp")).json(&tool_call(
        1,
        "discover_products",
        json!({"query": "gift box", "mode": "vector", "shop_id": SHOP_B}),
    ));
    for (name, value) in shop_headers(SHOP_A) {
        request = request.header(name, value);
    }
    let response: Value = request.send().await.unwrap().json().await.unwrap();

    assert_eq!(product_ids(&response), vec![701, 702]);
    assert_eq!(executor.queries()[0].shop_id, Some(SHOP_A));
}
