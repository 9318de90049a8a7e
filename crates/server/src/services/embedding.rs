//! Query embeddings via Vertex AI.
//!
//! Search text is embedded with `gemini-embedding-001` at 512 dimensions
//! using the `RETRIEVAL_QUERY` task type, which pairs with the
//! document-side embeddings stored in the product embedding table.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::EmbeddingError;
use super::gcp_auth::{GcpTokenSource, bearer};
use crate::config::GcpConfig;

/// Embedding model name.
pub const EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// Output dimensionality requested from the model.
pub const EMBEDDING_DIMENSION: u32 = 512;

const TASK_TYPE: &str = "RETRIEVAL_QUERY";

/// Converts query text into a vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed `text` as a retrieval query.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    content: &'a str,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    output_dimensionality: u32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    embeddings: Embeddings,
}

#[derive(Debug, Default, Deserialize)]
struct Embeddings {
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(default)]
    token_count: u64,
    #[serde(default)]
    truncated: bool,
}

/// Vertex AI `:predict` client for text embeddings.
pub struct VertexEmbeddingClient {
    client: reqwest::Client,
    tokens: Arc<GcpTokenSource>,
    endpoint: String,
}

impl VertexEmbeddingClient {
    /// Create a client for the configured project and region.
    #[must_use]
    pub fn new(client: reqwest::Client, tokens: Arc<GcpTokenSource>, config: &GcpConfig) -> Self {
        let base = format!("https://{}-aiplatform.googleapis.com", config.location);
        Self::with_base_url(client, tokens, config, &base)
    }

    /// Create a client against a custom API base URL.
    #[must_use]
    pub fn with_base_url(
        client: reqwest::Client,
        tokens: Arc<GcpTokenSource>,
        config: &GcpConfig,
        base_url: &str,
    ) -> Self {
        let endpoint = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{EMBEDDING_MODEL}:predict",
            base_url.trim_end_matches('/'),
            config.project_id,
            config.location,
        );
        Self {
            client,
            tokens,
            endpoint,
        }
    }
}

#[async_trait]
impl EmbeddingService for VertexEmbeddingClient {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let token = self.tokens.access_token().await?;

        let request = PredictRequest {
            instances: [Instance {
                content: text,
                task_type: TASK_TYPE,
            }],
            parameters: Parameters {
                output_dimensionality: EMBEDDING_DIMENSION,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(bearer(&token))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Vertex AI embedding request failed"
            );
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: PredictResponse = response.json().await?;
        let prediction = body
            .predictions
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResult)?;

        if prediction.embeddings.values.is_empty() {
            return Err(EmbeddingError::EmptyResult);
        }

        if let Some(stats) = &prediction.embeddings.statistics {
            tracing::info!(
                model = EMBEDDING_MODEL,
                token_count = stats.token_count,
                truncated = stats.truncated,
                dimension = prediction.embeddings.values.len(),
                "Embedding generated"
            );
        }

        Ok(prediction.embeddings.values)
    }
}
