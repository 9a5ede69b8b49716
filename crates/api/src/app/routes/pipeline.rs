use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    response::Response,
    routing::{get, post},
};

use djt_core::PipelineStatusUpdate;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:run_id", get(get_run_status))
        .route("/:run_id/:pipeline_id", get(get_pipeline))
        .route("/:run_id/:pipeline_id/status", post(update_status))
}

/// Run view: job, every pipeline and the run-level rollup.
pub async fn get_run_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(run_id): Path<String>,
) -> Response {
    let run_id = match dto::parse_job_id(&run_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    errors::respond(services.engine.runs.get_run_status(&run_id).await)
}

pub async fn get_pipeline(
    Extension(services): Extension<Arc<AppServices>>,
    Path((run_id, pipeline_id)): Path<(String, String)>,
) -> Response {
    let (run_id, pipeline_id) = match (dto::parse_job_id(&run_id), dto::parse_pipeline_id(&pipeline_id)) {
        (Ok(run), Ok(pipeline)) => (run, pipeline),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    errors::respond(services.engine.pipelines.get_pipeline(&run_id, &pipeline_id).await)
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path((run_id, pipeline_id)): Path<(String, String)>,
    body: Result<Json<PipelineStatusUpdate>, JsonRejection>,
) -> Response {
    let (run_id, pipeline_id) = match (dto::parse_job_id(&run_id), dto::parse_pipeline_id(&pipeline_id)) {
        (Ok(run), Ok(pipeline)) => (run, pipeline),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::rejection(rejection),
    };
    errors::respond(
        services
            .engine
            .pipelines
            .upsert_pipeline_status(&run_id, &pipeline_id, &update)
            .await,
    )
}
