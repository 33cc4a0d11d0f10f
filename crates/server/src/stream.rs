//! Response framing for the streamable HTTP transport.
//!
//! A POST answer is either a plain JSON body or a one-shot SSE stream carrying
//! a single numbered frame that is also buffered in the session. A GET opens a
//! standing SSE stream that replays buffered frames newer than the client's
//! `Last-Event-ID` and then idles until the client leaves or the session ends.

use crate::error::{TransportError, TransportResult};
use crate::session::{BufferedEvent, SessionStore};
use anyhow::Context;
use axum::{
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use ragbridge_mcp::protocol::JsonRpcResponse;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the session id in both directions.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Replay cursor header.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

const EVENT_STREAM: &str = "text/event-stream";

impl BufferedEvent {
    /// `id: <n>` followed by `data: <json>`
    pub fn to_sse_event(&self) -> Event {
        Event::default().id(self.id.to_string()).data(&self.payload)
    }
}

/// Whether the client asked for an SSE answer.
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(EVENT_STREAM))
}

/// Extract session ID from headers.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the replay cursor, if any.
pub fn last_event_id(headers: &HeaderMap) -> TransportResult<Option<u64>> {
    let Some(value) = headers.get(LAST_EVENT_ID_HEADER) else {
        return Ok(None);
    };

    let raw = value.to_str().unwrap_or_default().trim();
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| TransportError::InvalidLastEventId(raw.to_string()))
}

/// Chooses between JSON and SSE answers and serves replay streams.
#[derive(Clone)]
pub struct StreamManager {
    sessions: Arc<SessionStore>,
    keepalive: Duration,
}

impl StreamManager {
    pub fn new(sessions: Arc<SessionStore>, keepalive: Duration) -> Self {
        Self {
            sessions,
            keepalive,
        }
    }

    /// Deliver a dispatched response for a POST.
    pub async fn respond(
        &self,
        session_id: &str,
        response: &JsonRpcResponse,
        headers: &HeaderMap,
    ) -> TransportResult<Response> {
        if !wants_event_stream(headers) {
            return Ok(Json(response).into_response());
        }

        let payload =
            serde_json::to_string(response).context("Failed to encode JSON-RPC response")?;
        let event = self.sessions.record_event(session_id, payload).await?;
        debug!(
            "MCP: Streaming event {} for session {}",
            event.id, session_id
        );

        let frame = futures::stream::iter([Ok::<_, Infallible>(event.to_sse_event())]);
        Ok(Sse::new(frame).into_response())
    }

    /// Open a standing stream for a GET, replaying frames after `cursor`.
    pub async fn open(&self, session_id: &str, cursor: Option<u64>) -> TransportResult<Response> {
        let replay = self.sessions.replay_after(session_id, cursor).await?;

        if replay.truncated {
            warn!(
                "MCP: Replay cursor {:?} for session {} is older than the buffer, some frames are gone",
                cursor, session_id
            );
        }
        debug!(
            "MCP: SSE stream opened for session {} (replaying {} frame(s))",
            session_id,
            replay.events.len()
        );

        let guard = StreamGuard(session_id.to_string());
        let stream = async_stream::stream! {
            let _guard = guard;
            for event in replay.events {
                yield Ok::<_, Infallible>(event.to_sse_event());
            }
            // No server push beyond replay, hold the connection until the session ends
            replay.closed.cancelled().await;
        };

        Ok(Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(self.keepalive))
            .into_response())
    }
}

/// Logs when a standing stream goes away, whichever side closed it.
struct StreamGuard(String);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!("MCP: SSE stream closed for session {}", self.0);
    }
}
