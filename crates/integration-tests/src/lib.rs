//! Integration test harness for the Cyberbiz MCP server.
//!
//! Every external system is replaced by an in-process stub:
//!
//! - the authorization server and catalog API by axum routers bound to
//!   `127.0.0.1:0`, so the real `reqwest` clients are exercised;
//! - the embedding model and `BigQuery` by [`StubEmbeddings`] and
//!   [`RecordingExecutor`], which implement the server's service traits.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cyberbiz-mcp-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cyberbiz_mcp_server::auth::{TokenIntrospector, TokenVerifier};
use cyberbiz_mcp_server::config::{AuthMode, Cli, ServerConfig};
use cyberbiz_mcp_server::services::bigquery::SHOP_ID_PARAM;
use cyberbiz_mcp_server::services::{
    BigQueryError, EmbeddingError, EmbeddingService, QueryExecutor, QueryParam, QueryParams, Row,
};
use cyberbiz_mcp_server::state::AppState;
use serde_json::{Value, json};

/// Client secret that passes the config strength checks.
pub const CLIENT_SECRET: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6";

/// Service token used by header-mode deployments.
pub const SERVICE_TOKEN: &str = "svc-9f8e7d6c";

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// Authorization server stub
// =============================================================================

/// Introspection responses keyed by token; unknown tokens are inactive.
#[derive(Clone, Default)]
pub struct AuthServerStub {
    tokens: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<usize>>,
    reject_client: bool,
}

impl AuthServerStub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An authority that refuses this server's client credentials.
    #[must_use]
    pub fn rejecting_client() -> Self {
        Self {
            reject_client: true,
            ..Self::default()
        }
    }

    /// Register `token` as active for `shop_id` with space-delimited `scope`.
    #[must_use]
    pub fn with_token(self, token: &str, shop_id: i64, scope: &str) -> Self {
        self.tokens.lock().unwrap().insert(
            token.to_string(),
            json!({
                "active": true,
                "client_id": "shopping-agent",
                "scope": scope,
                "shop_id": shop_id,
                "shop_domain": format!("shop{shop_id}.cyberbiz.co"),
                "exp": 4_102_444_800_i64,
            }),
        );
        self
    }

    /// Number of introspection calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/oauth/introspect", post(introspect))
            .with_state(self.clone());
        serve(router).await
    }
}

async fn introspect(
    State(stub): State<AuthServerStub>,
    headers: HeaderMap,
    body: String,
) -> Response {
    *stub.calls.lock().unwrap() += 1;

    if stub.reject_client || !headers.contains_key("authorization") {
        return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
    }

    let token = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .unwrap_or_default()
        .to_string();
    let response = stub
        .tokens
        .lock()
        .unwrap()
        .get(&token)
        .cloned()
        .unwrap_or_else(|| json!({"active": false}));
    Json(response).into_response()
}

// =============================================================================
// Catalog API stub
// =============================================================================

/// A request the catalog stub received.
#[derive(Debug, Clone)]
pub struct CatalogRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub query: HashMap<String, String>,
}

/// Catalog API stub serving products whose title encodes their id.
///
/// Detail responses can be delayed per product to force out-of-order
/// completion.
#[derive(Clone, Default)]
pub struct CatalogStub {
    requests: Arc<Mutex<Vec<CatalogRequest>>>,
    delays: Arc<HashMap<i64, Duration>>,
}

impl CatalogStub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delays(delays: impl IntoIterator<Item = (i64, Duration)>) -> Self {
        Self {
            delays: Arc::new(delays.into_iter().collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<CatalogRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/v2/products", get(list_products))
            .route("/v2/products/{id}", get(get_product))
            .with_state(self.clone());
        format!("{}/v2", serve(router).await)
    }

    fn record(&self, path: String, headers: &HeaderMap, query: HashMap<String, String>) {
        self.requests.lock().unwrap().push(CatalogRequest {
            path,
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            query,
        });
    }
}

/// Catalog JSON for product `id`.
#[must_use]
pub fn product_json(id: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Product {id}"),
        "handle": format!("product-{id}"),
        "price": 100.0,
        "store_type": "shop",
        "genre": "normal",
        "product_variants": [{
            "id": id * 10,
            "name": "Default",
            "price": 100.0,
            "inventory_quantity": 5
        }]
    })
}

async fn list_products(
    State(stub): State<CatalogStub>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    stub.record("/products".to_string(), &headers, query);
    Json(json!([product_json(1), product_json(2)]))
}

async fn get_product(
    State(stub): State<CatalogStub>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    stub.record(format!("/products/{id}"), &headers, HashMap::new());
    if let Some(delay) = stub.delays.get(&id) {
        tokio::time::sleep(*delay).await;
    }
    if id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response();
    }
    Json(product_json(id)).into_response()
}

// =============================================================================
// Embedding and BigQuery stubs
// =============================================================================

/// Deterministic embedder: the vector depends only on the text.
#[derive(Default)]
pub struct StubEmbeddings {
    calls: Mutex<Vec<String>>,
}

impl StubEmbeddings {
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingService for StubEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().unwrap().push(text.to_string());
        let seed = text.bytes().map(f32::from).sum::<f32>();
        Ok((0..8u8).map(|i| (seed + f32::from(i)).sin()).collect())
    }
}

/// One query the executor received.
#[derive(Debug, Clone)]
pub struct ExecutedQuery {
    pub sql: String,
    pub shop_id: Option<i64>,
    pub params: QueryParams,
}

type RowsFn = dyn Fn(i64) -> Vec<(i64, f64)> + Send + Sync;

/// `BigQuery` stand-in returning `(product_id, distance)` rows chosen by the
/// bound shop id.
pub struct RecordingExecutor {
    queries: Mutex<Vec<ExecutedQuery>>,
    rows: Box<RowsFn>,
    latency: Duration,
}

impl RecordingExecutor {
    pub fn new(rows: impl Fn(i64) -> Vec<(i64, f64)> + Send + Sync + 'static) -> Self {
        Self {
            queries: Mutex::new(Vec::new()),
            rows: Box::new(rows),
            latency: Duration::ZERO,
        }
    }

    /// Sleep before answering, to interleave concurrent requests.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn queries(&self) -> Vec<ExecutedQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, BigQueryError> {
        let shop_id = match params.get(SHOP_ID_PARAM) {
            Some(QueryParam::Int(id)) => Some(*id),
            _ => None,
        };
        self.queries.lock().unwrap().push(ExecutedQuery {
            sql: sql.to_string(),
            shop_id,
            params: params.clone(),
        });

        tokio::time::sleep(self.latency).await;

        let rows = shop_id.map(|id| (self.rows)(id)).unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|(product_id, distance)| {
                let mut row = Row::new();
                row.insert("product_id".to_string(), json!(product_id));
                row.insert("distance".to_string(), json!(distance));
                row
            })
            .collect())
    }
}

// =============================================================================
// Server under test
// =============================================================================

/// Settings for a server under test.
pub struct ServerSetup {
    pub mode: AuthMode,
    pub transport: &'static str,
    pub catalog_url: String,
    pub auth_url: Option<String>,
    pub required_scopes: &'static str,
}

impl ServerSetup {
    #[must_use]
    pub fn headers(catalog_url: String) -> Self {
        Self {
            mode: AuthMode::Headers,
            transport: "streamable-http",
            catalog_url,
            auth_url: None,
            required_scopes: "",
        }
    }

    #[must_use]
    pub fn token(catalog_url: String, auth_url: String) -> Self {
        Self {
            mode: AuthMode::Token,
            transport: "streamable-http",
            catalog_url,
            auth_url: Some(auth_url),
            required_scopes: "",
        }
    }

    #[must_use]
    pub const fn sse(mut self) -> Self {
        self.transport = "sse";
        self
    }

    #[must_use]
    pub const fn requiring(mut self, scopes: &'static str) -> Self {
        self.required_scopes = scopes;
        self
    }

    fn config(&self) -> ServerConfig {
        let mut env: HashMap<&str, String> = HashMap::from([
            ("CYBERBIZ_API_BASE_URL", self.catalog_url.clone()),
            ("CYBERBIZ_API_TOKEN", SERVICE_TOKEN.to_string()),
            ("CYBERBIZ_GCP_PROJECT_ID", "cyberbiz-test".to_string()),
            (
                "PRODUCT_EMBEDDING_TABLE",
                "cyberbiz-test.embeddings.products".to_string(),
            ),
            ("REQUIRED_SCOPES", self.required_scopes.to_string()),
        ]);
        match self.mode {
            AuthMode::Headers => {
                env.insert("AUTH_MODE", "headers".to_string());
            }
            AuthMode::Token => {
                env.insert("AUTH_MODE", "token".to_string());
                env.insert(
                    "CYBERBIZ_AUTH_PUBLIC_URL",
                    self.auth_url.clone().unwrap_or_default(),
                );
                env.insert("MCP_SERVER_CLIENT_ID", "mcp-server".to_string());
                env.insert("MCP_SERVER_CLIENT_SECRET", CLIENT_SECRET.to_string());
            }
        }

        let cli = <Cli as clap::Parser>::parse_from([
            "cyberbiz-mcp-server",
            "--transport",
            self.transport,
        ]);
        ServerConfig::from_lookup(&cli, |k| env.get(k).cloned()).unwrap()
    }

    /// Start the server and return its base URL.
    pub async fn start(
        self,
        embeddings: Arc<StubEmbeddings>,
        executor: Arc<RecordingExecutor>,
    ) -> String {
        let config = self.config();
        let verifier: Option<Arc<dyn TokenVerifier>> = config
            .introspection
            .as_ref()
            .map(|c| Arc::new(TokenIntrospector::new(c).unwrap()) as Arc<dyn TokenVerifier>);
        let state = AppState::from_parts(config, verifier, embeddings, executor).unwrap();
        serve(cyberbiz_mcp_server::router(state)).await
    }
}

// =============================================================================
// MCP client helpers
// =============================================================================

/// A `tools/call` request body.
#[must_use]
pub fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

/// Shop headers for header-mode requests.
#[must_use]
pub fn shop_headers(shop_id: i64) -> [(&'static str, String); 2] {
    [
        ("x-shop-id", shop_id.to_string()),
        ("x-shop-domain", format!("shop{shop_id}.cyberbiz.co")),
    ]
}

/// Product ids, in order, from a `discover_products` response.
#[must_use]
pub fn product_ids(response: &Value) -> Vec<i64> {
    response["result"]["structuredContent"]["products"]
        .as_array()
        .map(|products| products.iter().filter_map(|p| p["id"].as_i64()).collect())
        .unwrap_or_default()
}
