//! API error types and response formatting.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error type that converts to XRPC-style JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request parameters.
    #[error("bad request: {0}")]
    InvalidRequest(String),

    /// The requested feed is not served here.
    #[error("unknown feed: {0}")]
    UnknownFeed(String),

    /// Store failure or other server-side problem.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<jetfeed_core::Error> for ApiError {
    fn from(err: jetfeed_core::Error) -> Self {
        use jetfeed_core::Error;
        match err {
            Error::UnknownFeed(feed) => Self::UnknownFeed(feed),
            err if err.is_client_error() => Self::InvalidRequest(err.to_string()),
            err => Self::Internal(err.to_string()),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "InvalidRequest", Some(msg)),
            Self::UnknownFeed(feed) => (
                StatusCode::NOT_FOUND,
                "UnknownFeed",
                Some(format!("feed '{feed}' is not served here")),
            ),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    Some("An internal error occurred".to_string()),
                )
            }
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}
