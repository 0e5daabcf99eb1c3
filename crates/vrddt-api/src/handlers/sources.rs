//! Reddit post handlers (`/reddit_videos`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use vrddt_models::{ResultVideoRecord, SourceVideoRecord};
use vrddt_store::{ContentStoreExt, Selector};

use crate::error::{ApiError, ApiResult};
use crate::handlers::videos::ResolveQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    /// Canonical form of the submitted URL
    pub url: String,
    /// False when the post was already known and nothing was published
    pub queued: bool,
}

/// Enqueue a post for conversion without waiting for it.
pub async fn queue_video(
    State(state): State<AppState>,
    Json(request): Json<QueueRequest>,
) -> ApiResult<(StatusCode, Json<QueueResponse>)> {
    let outcome = state.coordinator.enqueue(&request.url).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueueResponse {
            url: outcome.canonical_url,
            queued: outcome.published,
        }),
    ))
}

pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SourceVideoRecord>> {
    let source = state.store.find_source_video(&Selector::by_id(id)).await?;
    Ok(Json(source))
}

/// The finished video a post resolved to.
pub async fn get_source_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultVideoRecord>> {
    let source = state.store.find_source_video(&Selector::by_id(id.as_str())).await?;
    state
        .store
        .resolve_result(&source)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("post {} has not been converted yet", id)))
}

/// Look up a post by URL; the URL is canonicalized first.
pub async fn find_source(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Json<SourceVideoRecord>> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing required query parameter 'url'"))?;

    let canonical = state.coordinator.canonicalize(&url).await?;
    state
        .store
        .source_by_url(&canonical)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no post recorded for {}", canonical)))
}
