use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use djt_core::HealthStatus;

use crate::app::dto::{self, HoursQuery};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/job-tree/:job_id", get(job_tree))
        .route("/stats", get(overview))
        .route("/stats/by-status", get(by_status))
        .route("/stats/by-type", get(by_type))
        .route("/stats/by-priority", get(by_priority))
        .route("/performance", get(performance))
        .route("/throughput", get(throughput))
        .route("/active-jobs", get(active_jobs))
        .route("/failed-jobs", get(failed_jobs))
        .route("/queue-depth", get(queue_depth))
        .route("/worker-stats", get(worker_stats))
        .route("/health", get(health))
}

fn hours(query: Result<Query<HoursQuery>, QueryRejection>) -> Result<djt_core::HoursWindow, Response> {
    match query {
        Ok(Query(query)) => query.window(),
        Err(rejection) => Err(errors::rejection(rejection)),
    }
}

pub async fn job_tree(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> Response {
    let job_id = match dto::parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    errors::respond(services.engine.trees.get_job_tree(&job_id).await)
}

pub async fn overview(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.overview().await)
}

pub async fn by_status(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.by_status().await)
}

pub async fn by_type(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.by_type().await)
}

pub async fn by_priority(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.by_priority().await)
}

pub async fn performance(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<HoursQuery>, QueryRejection>,
) -> Response {
    let window = match hours(query) {
        Ok(window) => window,
        Err(resp) => return resp,
    };
    errors::respond(services.engine.stats.performance(window).await)
}

pub async fn throughput(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<HoursQuery>, QueryRejection>,
) -> Response {
    let window = match hours(query) {
        Ok(window) => window,
        Err(resp) => return resp,
    };
    errors::respond(services.engine.stats.throughput(window).await)
}

pub async fn active_jobs(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.active_jobs().await)
}

pub async fn failed_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<HoursQuery>, QueryRejection>,
) -> Response {
    let window = match hours(query) {
        Ok(window) => window,
        Err(resp) => return resp,
    };
    errors::respond(services.engine.stats.failed_jobs(window).await)
}

pub async fn queue_depth(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.queue_depth().await)
}

pub async fn worker_stats(Extension(services): Extension<Arc<AppServices>>) -> Response {
    errors::respond(services.engine.stats.worker_stats().await)
}

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let report = services.engine.stats.health().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}
