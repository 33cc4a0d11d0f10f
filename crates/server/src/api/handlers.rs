//! MCP Streamable HTTP endpoint handlers.
//!
//! - `POST /mcp` - Send a JSON-RPC request (answered as JSON or one-shot SSE)
//! - `GET /mcp` - Open an SSE stream, replaying frames after `Last-Event-ID`
//! - `DELETE /mcp` - Terminate a session

use crate::error::{TransportError, TransportResult};
use crate::stream::{self, SESSION_ID_HEADER};
use crate::transport::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use ragbridge_mcp::protocol::JsonRpcRequest;
use std::sync::Arc;
use tracing::{debug, info};

/// POST /mcp - Handle a JSON-RPC request.
///
/// A request without `Mcp-Session-Id` starts a new session; the id is always
/// returned in the response header.
pub async fn mcp_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> TransportResult<Response> {
    let request: JsonRpcRequest = serde_json::from_slice(&body)
        .map_err(|e| TransportError::MalformedBody(e.to_string()))?;

    let session_id = match stream::session_id(&headers) {
        Some(id) => {
            state.sessions.get(&id).await?;
            id
        }
        None => state.sessions.create().await,
    };

    debug!(
        "MCP POST: method={}, session={}",
        request.method, session_id
    );

    let response = state.dispatcher.dispatch(request).await;
    let mut http = state
        .streams
        .respond(&session_id, &response, &headers)
        .await?;

    if let Ok(value) = HeaderValue::from_str(&session_id) {
        http.headers_mut()
            .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
    }
    Ok(http)
}

/// GET /mcp - Open an SSE stream for a session.
pub async fn mcp_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> TransportResult<Response> {
    let session_id = stream::session_id(&headers).ok_or(TransportError::MissingSessionId)?;
    let cursor = stream::last_event_id(&headers)?;

    state.streams.open(&session_id, cursor).await
}

/// DELETE /mcp - Terminate a session.
///
/// Always 204, whether or not the session existed.
pub async fn mcp_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(session_id) = stream::session_id(&headers) {
        if !state.sessions.delete(&session_id).await {
            debug!("MCP: DELETE for unknown session {}", session_id);
        }
    } else {
        info!("MCP: DELETE without session id");
    }

    StatusCode::NO_CONTENT.into_response()
}
