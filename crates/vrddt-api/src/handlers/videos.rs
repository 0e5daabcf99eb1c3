//! Finished video handlers (`/vrddt_videos`).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use vrddt_models::ResultVideoRecord;
use vrddt_store::{ContentStoreExt, Selector};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for resolving a post.
#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub url: Option<String>,
}

/// Resolve a Reddit post URL to its finished video, converting it if needed.
pub async fn resolve_video(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Json<ResultVideoRecord>> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing required query parameter 'url'"))?;

    info!(url = %url, "Resolve requested");
    let result = state.coordinator.resolve(&url).await?;
    Ok(Json(result))
}

pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultVideoRecord>> {
    let result = state.store.find_result_video(&Selector::by_id(id)).await?;
    Ok(Json(result))
}

pub async fn get_video_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<ResultVideoRecord>> {
    state
        .store
        .result_by_hash(&hash.to_ascii_lowercase())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no video with md5 {}", hash)))
}
