use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use djt_core::{JobCreate, JobUpdate, TrackingError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_job))
        .route("/:run_id", get(get_job).patch(update_job).delete(delete_job))
}

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<JobCreate>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::rejection(rejection),
    };
    errors::respond(services.engine.jobs.create_job(request).await)
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(run_id): Path<String>,
) -> Response {
    let run_id = match dto::parse_job_id(&run_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services
        .engine
        .jobs
        .get_job(&run_id)
        .await
        .and_then(|job| job.ok_or_else(|| TrackingError::not_found(format!("job {run_id}"))));
    errors::respond(result)
}

pub async fn update_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(run_id): Path<String>,
    body: Result<Json<JobUpdate>, JsonRejection>,
) -> Response {
    let run_id = match dto::parse_job_id(&run_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::rejection(rejection),
    };
    errors::respond(services.engine.jobs.update_job(&run_id, update).await)
}

pub async fn delete_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(run_id): Path<String>,
) -> Response {
    let run_id = match dto::parse_job_id(&run_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.engine.jobs.delete_job(&run_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => errors::tracking_error_to_response(TrackingError::not_found(format!("job {run_id}"))),
        Err(err) => errors::tracking_error_to_response(err),
    }
}
