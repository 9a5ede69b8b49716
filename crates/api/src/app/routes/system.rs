use axum::http::StatusCode;

/// Liveness only; store health lives at `/tracking/health`.
pub async fn health() -> StatusCode {
    StatusCode::OK
}
