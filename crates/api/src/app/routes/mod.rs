use axum::Router;

pub mod jobs;
pub mod pipeline;
pub mod system;
pub mod tracking;

/// Router for all tracking endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/pipeline", pipeline::router())
        .nest("/tracking", tracking::router())
}
