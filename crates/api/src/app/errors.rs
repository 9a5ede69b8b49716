use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use djt_core::{TrackingError, TrackingResult};

pub fn tracking_error_to_response(err: TrackingError) -> Response {
    match err {
        TrackingError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        TrackingError::Validation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
        TrackingError::BackendUnavailable(msg) => {
            tracing::warn!(error = %msg, "tracking store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable", msg)
        }
        TrackingError::Corrupt(msg) => {
            tracing::error!(error = %msg, "corrupt tracking record");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_record", msg)
        }
    }
}

/// 200 with the JSON body, or the mapped error.
pub fn respond<T: Serialize>(result: TrackingResult<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => tracking_error_to_response(err),
    }
}

/// Request bodies, paths and queries that fail to extract are validation errors.
pub fn rejection(rejection: impl std::fmt::Display) -> Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", rejection.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
