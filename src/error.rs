use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors the relay detects itself.
///
/// An origin that answers with a non-2xx status is *not* an error: its
/// response is relayed unchanged. Only failures that prevent a response from
/// being obtained at all end up here.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No `url` query parameter (or an empty one).
    #[error("Missing 'url' query parameter")]
    MissingUrl,

    /// The `url` parameter is not a fetchable absolute URL.
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// The target resolves to an address the relay refuses to contact.
    #[error("Origin not allowed: {0}")]
    ForbiddenOrigin(String),

    /// The origin fetch itself failed (DNS, connect, TLS, body read).
    #[error("Stream Failed")]
    UpstreamFailed(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingUrl | RelayError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            RelayError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
            RelayError::UpstreamFailed(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON payload returned to the player.
    ///
    /// The `error` field is always a fixed literal; transport messages only
    /// ever appear under `details`.
    fn body(&self) -> serde_json::Value {
        match self {
            RelayError::MissingUrl => json!({ "error": "Missing 'url' query parameter" }),
            RelayError::InvalidUrl(_) => json!({ "error": "Invalid URL format" }),
            RelayError::ForbiddenOrigin(reason) => {
                json!({ "error": "Origin not allowed", "details": reason })
            }
            RelayError::UpstreamFailed(e) => {
                json!({ "error": "Stream Failed", "details": error_chain(e) })
            }
            RelayError::Internal(_) => json!({ "error": "Internal Server Error" }),
        }
    }
}

/// Flatten an error and its sources into one diagnostic line.
///
/// reqwest's top-level message ("error sending request for url ...") hides
/// the actual cause (connection refused, DNS, TLS) in its source chain.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", error_chain(&self));
        }

        (status, Json(self.body())).into_response()
    }
}
