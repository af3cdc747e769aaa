use axum::{http::StatusCode, response::IntoResponse};

/// Liveness probe. Answers without touching any origin.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
