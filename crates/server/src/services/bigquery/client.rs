//! `BigQuery` REST executor (`jobs.query` / `jobs.getQueryResults`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::rows::{Row, TableSchema, decode_rows};
use super::{BigQueryError, QueryExecutor, QueryParams};
use crate::services::gcp_auth::{GcpTokenSource, bearer};

/// Default REST API base URL.
const BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com";

/// Server-side wait per call, in milliseconds.
const QUERY_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on `getQueryResults` calls for one job.
const MAX_POLLS: usize = 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
    #[serde(default)]
    total_bytes_billed: Option<String>,
    #[serde(default)]
    errors: Vec<Value>,
}

/// Executes queries through the `BigQuery` REST API.
pub struct BigQueryRestExecutor {
    client: reqwest::Client,
    tokens: Arc<GcpTokenSource>,
    base_url: String,
    project_id: String,
}

impl BigQueryRestExecutor {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<GcpTokenSource>,
        project_id: impl Into<String>,
    ) -> Self {
        Self::with_base_url(client, tokens, project_id, BIGQUERY_BASE_URL)
    }

    /// Create an executor against a custom API base URL.
    #[must_use]
    pub fn with_base_url(
        client: reqwest::Client,
        tokens: Arc<GcpTokenSource>,
        project_id: impl Into<String>,
        base_url: &str,
    ) -> Self {
        Self {
            client,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    fn queries_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.base_url, self.project_id
        )
    }

    async fn check(response: reqwest::Response) -> Result<QueryResponse, BigQueryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BigQueryError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| BigQueryError::Decode(e.to_string()))?;

        if !body.errors.is_empty() {
            return Err(BigQueryError::JobFailed(Value::Array(body.errors).to_string()));
        }
        Ok(body)
    }

    async fn get_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, BigQueryError> {
        let token = self.tokens.access_token().await?;
        let mut query: Vec<(&str, String)> = vec![("timeoutMs", QUERY_TIMEOUT_MS.to_string())];
        if let Some(location) = &job.location {
            query.push(("location", location.clone()));
        }
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/{}", self.queries_url(), job.job_id))
            .bearer_auth(bearer(&token))
            .query(&query)
            .send()
            .await?;

        Self::check(response).await
    }

    async fn run(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, BigQueryError> {
        let token = self.tokens.access_token().await?;

        let request = json!({
            "query": sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": params.to_api(),
            "timeoutMs": QUERY_TIMEOUT_MS,
        });

        let response = self
            .client
            .post(self.queries_url())
            .bearer_auth(bearer(&token))
            .json(&request)
            .send()
            .await?;

        let mut result = Self::check(response).await?;

        let mut polls = 0;
        while !result.job_complete {
            let job = result
                .job_reference
                .clone()
                .ok_or_else(|| BigQueryError::Decode("incomplete job without reference".into()))?;
            polls += 1;
            if polls > MAX_POLLS {
                return Err(BigQueryError::PollLimit { job_id: job.job_id });
            }
            tracing::debug!(job_id = %job.job_id, polls, "BigQuery job still running");
            result = self.get_results(&job, None).await?;
        }

        let schema = result.schema.clone().unwrap_or_default();
        let mut rows = decode_rows(&schema, &result.rows)?;

        let mut page_token = result.page_token.clone();
        while let Some(token) = page_token {
            let job = result
                .job_reference
                .clone()
                .ok_or_else(|| BigQueryError::Decode("paged result without job reference".into()))?;
            let page = self.get_results(&job, Some(&token)).await?;
            rows.extend(decode_rows(&schema, &page.rows)?);
            page_token = page.page_token;
        }

        tracing::info!(
            rows = rows.len(),
            dml_affected = result.num_dml_affected_rows.as_deref().unwrap_or("0"),
            bytes_processed = result.total_bytes_processed.as_deref().unwrap_or("0"),
            bytes_billed = result.total_bytes_billed.as_deref().unwrap_or("0"),
            "BigQuery completed"
        );

        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for BigQueryRestExecutor {
    #[instrument(skip(self, sql, params), fields(project = %self.project_id))]
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, BigQueryError> {
        let preview: String = sql.chars().take(200).collect();
        tracing::info!(sql = %preview, "BigQuery executing");

        self.run(sql, params).await.inspect_err(|e| {
            tracing::error!(sql = %preview, error = %e, "BigQuery failed");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use secrecy::SecretString;

    use super::*;
    use crate::test_support::serve;

    fn tokens() -> Arc<GcpTokenSource> {
        Arc::new(GcpTokenSource::new(
            reqwest::Client::new(),
            Some(SecretString::from("bq-token")),
        ))
    }

    fn schema() -> Value {
        json!({"fields": [
            {"name": "product_id", "type": "INTEGER"},
            {"name": "distance", "type": "FLOAT"}
        ]})
    }

    #[tokio::test]
    async fn test_execute_sends_named_parameters() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::default();
        let sink = captured.clone();
        let router = Router::new().route(
            "/bigquery/v2/projects/proj/queries",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(json!({
                        "jobComplete": true,
                        "schema": schema(),
                        "rows": [{"f": [{"v": "7"}, {"v": "0.1"}]}],
                        "totalBytesProcessed": "1024",
                        "totalBytesBilled": "10485760"
                    }))
                }
            }),
        );
        let base = serve(router).await;
        let executor =
            BigQueryRestExecutor::with_base_url(reqwest::Client::new(), tokens(), "proj", &base);

        let params = QueryParams::new().with("shop_id", 146_i64).with("limit", 5_i64);
        let rows = executor
            .execute("SELECT 1 WHERE shop_id = @shop_id", &params)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["product_id"], json!(7));

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["useLegacySql"], false);
        assert_eq!(body["parameterMode"], "NAMED");
        let names: Vec<&str> = body["queryParameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["limit", "shop_id"]);
    }

    #[tokio::test]
    async fn test_dml_returns_empty_rows() {
        let router = Router::new().route(
            "/bigquery/v2/projects/proj/queries",
            post(|| async {
                Json(json!({"jobComplete": true, "numDmlAffectedRows": "3"}))
            }),
        );
        let base = serve(router).await;
        let executor =
            BigQueryRestExecutor::with_base_url(reqwest::Client::new(), tokens(), "proj", &base);

        let rows = executor
            .execute("UPDATE t SET a = 1 WHERE shop_id = @shop_id", &QueryParams::new())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_polls_until_job_complete() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let router = Router::new()
            .route(
                "/bigquery/v2/projects/proj/queries",
                post(|| async {
                    Json(json!({
                        "jobComplete": false,
                        "jobReference": {"projectId": "proj", "jobId": "job_1", "location": "US"}
                    }))
                }),
            )
            .route(
                "/bigquery/v2/projects/proj/queries/{job_id}",
                get(
                    move |Path(job_id): Path<String>,
                          Query(q): Query<std::collections::HashMap<String, String>>| {
                        let counter = counter.clone();
                        async move {
                            assert_eq!(job_id, "job_1");
                            assert_eq!(q.get("location").map(String::as_str), Some("US"));
                            let n = counter.fetch_add(1, Ordering::SeqCst);
                            if n == 0 {
                                Json(json!({
                                    "jobComplete": false,
                                    "jobReference": {"jobId": "job_1", "location": "US"}
                                }))
                            } else {
                                Json(json!({
                                    "jobComplete": true,
                                    "jobReference": {"jobId": "job_1", "location": "US"},
                                    "schema": schema(),
                                    "rows": [{"f": [{"v": "1"}, {"v": "0.3"}]}]
                                }))
                            }
                        }
                    },
                ),
            );
        let base = serve(router).await;
        let executor =
            BigQueryRestExecutor::with_base_url(reqwest::Client::new(), tokens(), "proj", &base);

        let rows = executor.execute("SELECT 1", &QueryParams::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_error_propagates() {
        let router = Router::new().route(
            "/bigquery/v2/projects/proj/queries",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": {"message": "Syntax error"}})),
                )
            }),
        );
        let base = serve(router).await;
        let executor =
            BigQueryRestExecutor::with_base_url(reqwest::Client::new(), tokens(), "proj", &base);

        let err = executor
            .execute("SELEC 1", &QueryParams::new())
            .await
            .unwrap_err();
        match err {
            BigQueryError::Http { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Syntax error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
