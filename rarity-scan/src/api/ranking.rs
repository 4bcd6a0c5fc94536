//! Ranking API handlers
//!
//! Rankings are served from finished scans held in memory and fall back to
//! the result cache.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::RankedDataset;
use crate::report::{self, ItemDetail, RankingPage, DEFAULT_PAGE_SIZE};
use crate::services::{normalize_collection_key, rank_collection};
use crate::AppState;

/// Query parameters of the ranking endpoint
#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

/// DELETE /cache response
#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared: bool,
}

/// Ranked dataset for a collection, loading and ranking a cached result on a
/// miss
async fn dataset_for(state: &AppState, collection: &str) -> ApiResult<Arc<RankedDataset>> {
    let key = normalize_collection_key(collection).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let Some(dataset) = state.datasets.read().await.get(&key) {
        return Ok(Arc::clone(dataset));
    }

    let stored = state
        .store
        .load(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No scan result for {}", key)))?;

    let dataset = Arc::new(rank_collection(&stored.into_consistent()));
    state
        .datasets
        .write()
        .await
        .insert(key, Arc::clone(&dataset));
    Ok(dataset)
}

/// GET /collections/:collection/ranking?page&limit
pub async fn get_ranking(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<Json<RankingPage>> {
    let dataset = dataset_for(&state, &collection).await?;
    let page = report::paginate(&dataset, query.page, query.limit, &state.gateway)?;
    Ok(Json(page))
}

/// GET /collections/:collection/items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, u64)>,
) -> ApiResult<Json<ItemDetail>> {
    let dataset = dataset_for(&state, &collection).await?;
    report::item_detail(&dataset, id, &state.gateway)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Item {} not in ranking", id)))
}

/// DELETE /cache
///
/// Clears the result cache and the in-memory rankings. Refused while scans
/// are running.
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<ClearCacheResponse>> {
    let active = state.active_scans.read().await;
    if !active.is_empty() {
        return Err(ApiError::Conflict(format!(
            "Cannot clear the result cache while {} scan(s) are running",
            active.len()
        )));
    }
    state.store.clear().await?;
    state.datasets.write().await.clear();
    tracing::info!("Result cache cleared via API");
    Ok(Json(ClearCacheResponse { cleared: true }))
}

/// Build ranking routes
pub fn ranking_routes() -> Router<AppState> {
    Router::new()
        .route("/collections/:collection/ranking", get(get_ranking))
        .route("/collections/:collection/items/:id", get(get_item))
        .route("/cache", delete(clear_cache))
}
