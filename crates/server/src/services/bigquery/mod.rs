//! Tenant-scoped analytical queries against `BigQuery`.
//!
//! [`TenantQueryClient`] is the only way the rest of the server reaches the
//! analytical store. It binds the current request's shop id under the
//! reserved `@shop_id` parameter on every call, so no query can run without a
//! tenant constraint available to it.

mod client;
pub mod params;
mod rows;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use client::BigQueryRestExecutor;
pub use params::{QueryParam, QueryParams, SHOP_ID_PARAM};
pub use rows::Row;

use super::GcpAuthError;
use crate::tenant::{self, TenantContextError};

/// Errors from analytical queries.
#[derive(Debug, Error)]
pub enum BigQueryError {
    /// No tenant is bound to the current request.
    #[error(transparent)]
    TenantContext(#[from] TenantContextError),

    /// Could not obtain a GCP access token.
    #[error("GCP auth error: {0}")]
    Auth(#[from] GcpAuthError),

    /// The API answered with a non-success status.
    #[error("BigQuery HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network or timeout failure.
    #[error("BigQuery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The job reported errors.
    #[error("BigQuery job failed: {0}")]
    JobFailed(String),

    /// The job did not complete within the polling budget.
    #[error("BigQuery job {job_id} did not complete")]
    PollLimit { job_id: String },

    /// The response could not be decoded.
    #[error("BigQuery decode error: {0}")]
    Decode(String),
}

/// Runs a parameterized query and returns decoded rows.
///
/// DML statements return an empty row list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, BigQueryError>;
}

/// Query client that always constrains queries to the current tenant.
#[derive(Clone)]
pub struct TenantQueryClient {
    executor: Arc<dyn QueryExecutor>,
}

impl TenantQueryClient {
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Execute `sql` with `params` plus `@shop_id` bound to the current tenant.
    ///
    /// A caller-supplied `shop_id` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`BigQueryError::TenantContext`] if no tenant is bound, or the
    /// executor's error unchanged.
    pub async fn query(
        &self,
        sql: &str,
        mut params: QueryParams,
    ) -> Result<Vec<Row>, BigQueryError> {
        let shop_id = tenant::current_shop_id().inspect_err(|e| {
            tracing::error!(error = %e, "Analytical query attempted without tenant context");
        })?;

        let bound = QueryParam::Int(shop_id.as_i64());
        if let Some(previous) = params
            .insert(SHOP_ID_PARAM, bound.clone())
            .filter(|previous| *previous != bound)
        {
            tracing::warn!(
                supplied = ?previous,
                shop_id = %shop_id,
                "Caller-supplied shop_id parameter overwritten with the request tenant"
            );
        }

        self.executor.execute(sql, &params).await
    }
}
