//! Transport-tier errors.
//!
//! These never enter the JSON-RPC envelope: they become HTTP 4xx/5xx responses
//! with an `{ "error": ... }` body.

use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Result type for transport handlers.
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Body was not a JSON-RPC request.
    #[error("Invalid JSON-RPC request body")]
    MalformedBody(String),

    #[error("Mcp-Session-Id header required")]
    MissingSessionId,

    #[error("Invalid Last-Event-ID header")]
    InvalidLastEventId(String),

    #[error("Session not found")]
    SessionNotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl TransportError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) | Self::MissingSessionId | Self::InvalidLastEventId(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::MalformedBody(detail) => Some(detail.clone()),
            Self::InvalidLastEventId(value) => Some(format!("not an event id: {}", value)),
            Self::SessionNotFound(id) => Some(id.clone()),
            Self::MissingSessionId => None,
            // Internal causes are logged, not sent to the client
            Self::Internal(_) => None,
        }
    }
}

impl From<SessionError> for TransportError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::SessionNotFound(id),
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(err) => tracing::error!("MCP transport failure: {:#}", err),
            other => tracing::warn!("Rejecting MCP request ({}): {}", status, other),
        }

        let body = match self.details() {
            Some(details) => ErrorResponse::with_details(self.to_string(), details),
            None => ErrorResponse::new(self.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

/// Error body for every non-JSON-RPC failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
