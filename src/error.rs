//! Error kinds and their mapping to the Anthropic-shaped error envelope.
//!
//! Grounded on `examples/dirmacs-ares/src/types/mod.rs`'s `AppError` ->
//! `IntoResponse` pattern, reshaped to this gateway's wire format (§6.2, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed request body or schema violation from the client.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Thinking requested on a non-capable model while `strict_thinking` is set.
    #[error("thinking not supported on this model")]
    ThinkingNotSupported,

    /// The upstream Ollama server could not be reached at all.
    #[error("failed to reach ollama: {0}")]
    UpstreamConnection(String),

    /// The upstream Ollama server responded with an error status.
    #[error("ollama error: {message}")]
    Upstream { status: StatusCode, message: String },

    /// Anything else unexpected during non-streaming handling.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    #[serde(rename = "type")]
    envelope_type: &'static str,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    message: String,
}

impl AppError {
    /// The `error.type` string used in the response envelope (§6.2).
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "api_error",
            AppError::ThinkingNotSupported => "thinking_not_supported",
            AppError::UpstreamConnection(_) => "api_connection_error",
            AppError::Upstream { .. } => "api_error",
            AppError::Internal(_) => "api_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ThinkingNotSupported => StatusCode::BAD_REQUEST,
            AppError::UpstreamConnection(_) => StatusCode::BAD_GATEWAY,
            AppError::Upstream { status, .. } => {
                if status.is_client_error() {
                    *status
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();
        log::error!(
            "event=request.error kind={} status={} message={}",
            kind,
            status.as_u16(),
            message
        );
        let body = ErrorEnvelope {
            envelope_type: "error",
            error: ErrorBody { kind, message },
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
