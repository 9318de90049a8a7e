//! MCP tools exposed to agents.
//!
//! `discover_products` is backed by the search engine. The order tools are
//! fixed-shape placeholders for the order and support backends; nothing in
//! product discovery depends on them.

pub mod discover;
pub mod orders;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use crate::auth::{CatalogCredential, VerifiedToken};
use crate::error::AppError;
use crate::search::{ProductSearchEngine, SearchError};
use crate::state::AppState;

/// Why a tool call did not produce a result.
///
/// These are reported to the agent as tool results with `isError: true`,
/// not as protocol errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required scope: {0}")]
    InsufficientScope(&'static str),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ToolError {
    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) | Self::Search(SearchError::InvalidQuery(_)) => {
                "invalid_arguments"
            }
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::Search(_) => "search_failed",
        }
    }

    /// Convert into an MCP tool result, reporting server faults to Sentry.
    fn into_call_result(self, tool: &str) -> Value {
        let code = self.code();
        let message = match self {
            Self::Search(e) => {
                let err = AppError::from(e);
                if err.is_server_error() {
                    let event_id = sentry::capture_error(&err);
                    tracing::error!(
                        tool,
                        error = %err,
                        sentry_event_id = %event_id,
                        "Tool call failed"
                    );
                }
                err.public_message()
            }
            other => {
                tracing::info!(tool, error = %other, "Tool call rejected");
                other.to_string()
            }
        };

        json!({
            "content": [{ "type": "text", "text": message }],
            "structuredContent": { "error": code, "error_description": message },
            "isError": true,
        })
    }
}

/// Per-call context handed to a tool.
#[derive(Clone)]
pub struct ToolContext {
    pub state: AppState,
    pub credential: CatalogCredential,
    /// Verified bearer token; `None` in header mode.
    pub token: Option<VerifiedToken>,
}

impl ToolContext {
    /// Search engine bound to this call's catalog credential.
    #[must_use]
    pub fn search_engine(&self) -> ProductSearchEngine {
        self.state.search_engine(&self.credential)
    }
}

/// A callable MCP tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value;

    /// Scope a bearer token must carry to call this tool.
    fn required_scope(&self) -> Option<&'static str> {
        None
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError>;
}

/// The tool was not registered.
#[derive(Debug, Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

/// The tools this server offers, in listing order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with every shopping tool.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            tools: vec![
                Box::new(discover::DiscoverProducts),
                Box::new(orders::CheckPurchaseFeasibility),
                Box::new(orders::PlaceOrder),
                Box::new(orders::CheckOrder),
                Box::new(orders::ModifyOrder),
                Box::new(orders::CancelOrder),
                Box::new(orders::HandleAfterSales),
            ],
        }
    }

    /// Tool definitions for `tools/list`.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }

    /// Run the named tool and wrap its outcome as an MCP tool result.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownTool`] if no tool has that name. Every other failure
    /// is reported inside the result.
    pub async fn call(
        &self,
        name: &str,
        ctx: &ToolContext,
        args: Value,
    ) -> Result<Value, UnknownTool> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| UnknownTool(name.to_string()))?;

        let outcome = match check_scope(tool.as_ref(), ctx.token.as_ref()) {
            Ok(()) => tool.call(ctx, args).await,
            Err(e) => Err(e),
        };

        Ok(match outcome {
            Ok(value) => {
                tracing::info!(tool = name, "Tool call succeeded");
                json!({
                    "content": [{ "type": "text", "text": value.to_string() }],
                    "structuredContent": value,
                    "isError": false,
                })
            }
            Err(e) => e.into_call_result(name),
        })
    }
}

/// Header mode carries no token and therefore no scopes to check.
fn check_scope(tool: &dyn Tool, token: Option<&VerifiedToken>) -> Result<(), ToolError> {
    match (tool.required_scope(), token) {
        (Some(scope), Some(token)) if !token.has_scope(scope) => {
            Err(ToolError::InsufficientScope(scope))
        }
        _ => Ok(()),
    }
}

/// Deserialize a tool's arguments, treating absent arguments as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
