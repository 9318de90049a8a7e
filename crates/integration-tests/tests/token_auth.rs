//! Token-mode authentication through the full router.
//!
//! A real `TokenIntrospector` talks to a stub authorization server; the
//! caller's token must reach the catalog API unchanged.

use std::sync::Arc;

use cyberbiz_mcp_integration_tests::{
    AuthServerStub, CatalogStub, RecordingExecutor, ServerSetup, StubEmbeddings, tool_call,
};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct Harness {
    base: String,
    auth: AuthServerStub,
    catalog: CatalogStub,
    client: reqwest::Client,
}

async fn harness(auth: AuthServerStub, scopes: &'static str) -> Harness {
    let catalog = CatalogStub::new();
    let catalog_url = catalog.start().await;
    let auth_url = auth.start().await;
    let base = ServerSetup::token(catalog_url, auth_url)
        .requiring(scopes)
        .start(
            Arc::new(StubEmbeddings::default()),
            Arc::new(RecordingExecutor::new(|_| Vec::new())),
        )
        .await;
    Harness {
        base,
        auth,
        catalog,
        client: reqwest::Client::new(),
    }
}

impl Harness {
    async fn post(&self, token: Option<&str>, body: &Value) -> reqwest::Response {
        let mut request = self.client.post(format!("{}/mcp", self.base)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }
}

fn ping() -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})
}

#[tokio::test]
async fn test_active_token_reaches_catalog_unchanged() {
    let h = harness(
        AuthServerStub::new().with_token("agent-tok-1", 146, "read_products"),
        "",
    )
    .await;

    let response = h
        .post(
            Some("agent-tok-1"),
            &tool_call(1, "discover_products", json!({"query": "tea"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["structuredContent"]["total_results"], 2);

    let requests = h.catalog.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Bearer agent-tok-1")
    );
    assert_eq!(h.auth.calls(), 1);
}

#[tokio::test]
async fn test_missing_token_challenged_without_introspection() {
    let h = harness(AuthServerStub::new(), "").await;

    let response = h.post(None, &ping()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()["www-authenticate"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(challenge.contains("/.well-known/oauth-protected-resource"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "authentication_required");
    assert_eq!(h.auth.calls(), 0);
}

#[tokio::test]
async fn test_inactive_token_rejected_before_any_downstream_call() {
    let h = harness(AuthServerStub::new(), "").await;

    let response = h
        .post(
            Some("revoked"),
            &tool_call(1, "discover_products", json!({"query": "tea"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");
    assert!(h.catalog.requests().is_empty());
}

#[tokio::test]
async fn test_missing_required_scope_forbidden() {
    let h = harness(
        AuthServerStub::new().with_token("narrow", 146, "read_orders"),
        "read_products",
    )
    .await;

    let response = h.post(Some("narrow"), &ping()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_scope");
}

#[tokio::test]
async fn test_tool_scope_gated_per_call() {
    let h = harness(
        AuthServerStub::new().with_token("reader", 146, "read_products"),
        "",
    )
    .await;

    let response = h
        .post(
            Some("reader"),
            &tool_call(1, "check_order", json!({"order_id": "ORD-1"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["structuredContent"]["error"],
        "insufficient_scope"
    );
}

#[tokio::test]
async fn test_rejected_client_credentials_is_server_error() {
    let h = harness(AuthServerStub::rejecting_client(), "").await;

    let response = h.post(Some("anything"), &ping()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(
        !body["error_description"]
            .as_str()
            .unwrap()
            .contains("invalid_client")
    );
}

#[tokio::test]
async fn test_unreachable_authority_is_bad_gateway() {
    let catalog = CatalogStub::new();
    let catalog_url = catalog.start().await;
    let base = ServerSetup::token(catalog_url, "http://127.0.0.1:1".to_string())
        .start(
            Arc::new(StubEmbeddings::default()),
            Arc::new(RecordingExecutor::new(|_| Vec::new())),
        )
        .await;

    let response = reqwest::Client::new()
        .post(format!("{base}/mcp"))
        .bearer_auth("t")
        .json(&ping())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_protected_resource_metadata_names_authority() {
    let auth = AuthServerStub::new();
    let h = harness(auth, "read_products").await;

    let body: Value = h
        .client
        .get(format!("{}/.well-known/oauth-protected-resource", h.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(
        body["authorization_servers"][0]
            .as_str()
            .unwrap()
            .starts_with("http://127.0.0.1:")
    );
    assert_eq!(body["scopes_supported"], json!(["read_products"]));
}
