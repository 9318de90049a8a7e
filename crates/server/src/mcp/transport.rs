//! HTTP transports for the MCP endpoint.
//!
//! - `streamable-http`: `POST /mcp` answers each message in the response body.
//! - `sse`: `GET /sse` opens an event stream whose first `endpoint` event names
//!   the URL to post messages to; responses arrive as `message` events.
//!
//! Both run behind the authentication gate, so every handler here executes
//! with the caller's tenant bound.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use cyberbiz_mcp_core::TenantIdentity;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::handler::handle_message;
use super::protocol::JsonRpcResponse;
use crate::auth::{CatalogCredential, VerifiedToken};
use crate::error::AppError;
use crate::state::AppState;
use crate::tenant;
use crate::tools::ToolContext;

/// Path clients post SSE-session messages to.
pub const MESSAGES_PATH: &str = "/messages";

const SESSION_BUFFER: usize = 32;

struct SseSession {
    tenant: TenantIdentity,
    sender: mpsc::Sender<JsonRpcResponse>,
}

/// Open SSE sessions keyed by session id.
#[derive(Clone, Default)]
pub struct SseSessions {
    inner: Arc<Mutex<HashMap<Uuid, SseSession>>>,
}

impl SseSessions {
    fn insert(&self, id: Uuid, session: SseSession) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session);
    }

    fn remove(&self, id: Uuid) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Sender for `id`, only if the session belongs to `tenant`.
    fn sender_for(
        &self,
        id: Uuid,
        tenant: &TenantIdentity,
    ) -> Option<mpsc::Sender<JsonRpcResponse>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .filter(|session| &session.tenant == tenant)
            .map(|session| session.sender.clone())
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the session when its stream is dropped.
struct SessionGuard {
    sessions: SseSessions,
    id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(self.id);
        tracing::debug!(session_id = %self.id, "SSE session closed");
    }
}

fn tool_context(
    state: AppState,
    credential: CatalogCredential,
    token: Option<Extension<VerifiedToken>>,
) -> ToolContext {
    ToolContext {
        state,
        credential,
        token: token.map(|Extension(token)| token),
    }
}

/// Streamable HTTP: one message in, one response out.
///
/// POST /mcp
pub async fn streamable_http(
    State(state): State<AppState>,
    Extension(credential): Extension<CatalogCredential>,
    token: Option<Extension<VerifiedToken>>,
    body: String,
) -> Response {
    let ctx = tool_context(state, credential, token);
    match handle_message(&ctx, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Open an SSE session.
///
/// GET /sse
pub async fn sse_connect(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let tenant = tenant::current()?;
    let id = Uuid::new_v4();
    let (sender, mut receiver) = mpsc::channel(SESSION_BUFFER);

    let sessions = state.sessions().clone();
    sessions.insert(id, SseSession { tenant, sender });
    tracing::info!(session_id = %id, "SSE session opened");

    let guard = SessionGuard { sessions, id };
    let endpoint = format!("{MESSAGES_PATH}?session_id={id}");

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = receiver.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => yield Ok(Event::default().event("message").data(json)),
                Err(e) => tracing::error!(error = %e, "Failed to serialize SSE message"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    session_id: Uuid,
}

/// Deliver a client message to an SSE session.
///
/// POST /messages?session_id=<uuid>
pub async fn sse_message(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Extension(credential): Extension<CatalogCredential>,
    token: Option<Extension<VerifiedToken>>,
    body: String,
) -> Result<StatusCode, AppError> {
    let tenant = tenant::current()?;

    // Sessions owned by another shop are reported as missing.
    let sender = state
        .sessions()
        .sender_for(query.session_id, &tenant)
        .ok_or_else(|| AppError::NotFound(format!("session {}", query.session_id)))?;

    let ctx = tool_context(state, credential, token);
    if let Some(response) = handle_message(&ctx, &body).await
        && sender.send(response).await.is_err()
    {
        tracing::warn!(session_id = %query.session_id, "SSE session closed before response");
        return Err(AppError::NotFound(format!("session {}", query.session_id)));
    }

    Ok(StatusCode::ACCEPTED)
}
