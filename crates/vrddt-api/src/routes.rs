//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    find_source, get_source, get_source_result, get_video, get_video_by_hash, health, queue_video, ready,
    resolve_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/vrddt_videos", get(resolve_video))
        .route("/vrddt_videos/", get(resolve_video))
        .route("/vrddt_videos/md5/:hash", get(get_video_by_hash))
        .route("/vrddt_videos/:id", get(get_video));

    let source_routes = Router::new()
        .route("/reddit_videos", get(find_source))
        .route("/reddit_videos/", get(find_source))
        .route("/reddit_videos/queue", post(queue_video))
        .route("/reddit_videos/:id", get(get_source))
        .route("/reddit_videos/:id/vrddt_video", get(get_source_result));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(video_routes)
        .merge(source_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
