//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    cancel_bulk_job, create_bulk_job, get_bulk_job, get_video, health, process_video, publish_video, ready,
    render_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/videos/:video_id", get(get_video))
        .route("/videos/:video_id/process", post(process_video))
        .route("/videos/:video_id/render", post(render_video))
        .route("/videos/:video_id/publish", post(publish_video));

    let bulk_routes = Router::new()
        .route("/bulk-jobs", post(create_bulk_job))
        .route("/bulk-jobs/:job_id", get(get_bulk_job))
        .route("/bulk-jobs/:job_id/cancel", post(cancel_bulk_job));

    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));
    let api_routes = Router::new()
        .merge(video_routes)
        .merge(bulk_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
