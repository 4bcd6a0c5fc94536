//! Scan API handlers
//!
//! POST /scans starts a background scan, GET /scans lists running ones.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rarity_common::ScanEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::{
    normalize_collection_key, run_collection, EventObserver, ScanDeps, ScanRequest,
    SchedulerConfig,
};
use crate::AppState;

/// POST /scans request
#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub collection: String,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub use_cache: Option<bool>,
}

/// POST /scans response
#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub scan_id: Uuid,
    pub collection: String,
    pub started_at: DateTime<Utc>,
}

/// Running scan entry of GET /scans
#[derive(Debug, Serialize)]
pub struct ActiveScan {
    pub scan_id: Uuid,
    pub collection: String,
}

/// POST /scans
///
/// Validates the request, then runs the scan in the background.
/// Returns 202 Accepted with the scan id; progress is published on /events.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<StartScanRequest>,
) -> ApiResult<(StatusCode, Json<StartScanResponse>)> {
    let key = normalize_collection_key(&request.collection)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let scan_request = ScanRequest {
        collection: key.clone(),
        concurrency: request.concurrency.unwrap_or(state.defaults.concurrency),
        max_attempts: request.max_attempts.unwrap_or(state.defaults.max_attempts),
        use_cache: request.use_cache.unwrap_or(state.defaults.use_cache),
    };
    SchedulerConfig::new(scan_request.concurrency, scan_request.max_attempts)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let source = state.sources.source_for(&key)?;

    let scan_id = Uuid::new_v4();
    {
        let mut active = state.active_scans.write().await;
        if let Some(running) = active.get(&key) {
            return Err(ApiError::Conflict(format!(
                "Scan {} of {} already running",
                running, key
            )));
        }

        // A scan without cache wipes the shared store, so it runs alone
        let mut clearing = state.cache_clearing_scan.write().await;
        if let Some(running) = *clearing {
            return Err(ApiError::Conflict(format!(
                "Scan {} is clearing the result cache",
                running
            )));
        }
        if !scan_request.use_cache {
            if !active.is_empty() {
                return Err(ApiError::Conflict(format!(
                    "Cannot clear the result cache while {} scan(s) are running",
                    active.len()
                )));
            }
            *clearing = Some(scan_id);
            state.datasets.write().await.clear();
        }
        active.insert(key.clone(), scan_id);
    }

    let deps = ScanDeps {
        source,
        fetcher: Arc::clone(&state.fetcher),
        gateway: state.gateway.clone(),
        store: Arc::clone(&state.store),
    };

    tracing::info!(scan_id = %scan_id, collection = %key, "Scan accepted");

    let state_clone = state.clone();
    tokio::spawn(async move {
        execute_scan(state_clone, scan_id, scan_request, deps).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            scan_id,
            collection: key,
            started_at: Utc::now(),
        }),
    ))
}

/// Background body of a scan started over HTTP
async fn execute_scan(state: AppState, scan_id: Uuid, request: ScanRequest, deps: ScanDeps) {
    let key = request.collection.clone();
    let observer = EventObserver::new(state.event_bus.clone(), scan_id, key.clone());

    match run_collection(&request, &deps, &observer).await {
        Ok(report) => {
            let items = report.dataset.len();
            state
                .datasets
                .write()
                .await
                .insert(key.clone(), Arc::new(report.dataset));

            tracing::info!(scan_id = %scan_id, collection = %key, items, "Scan finished");
            state.event_bus.emit_lossy(ScanEvent::ScanCompleted {
                scan_id,
                collection: key.clone(),
                items,
                abandoned: report.abandoned.len(),
                from_cache: report.from_cache,
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            tracing::error!(scan_id = %scan_id, collection = %key, error = %e, "Scan failed");
            *state.last_error.write().await = Some(e.to_string());
            state.event_bus.emit_lossy(ScanEvent::ScanFailed {
                scan_id,
                collection: key.clone(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    let mut active = state.active_scans.write().await;
    let mut clearing = state.cache_clearing_scan.write().await;
    if *clearing == Some(scan_id) {
        *clearing = None;
    }
    active.remove(&key);
}

/// GET /scans
pub async fn list_scans(State(state): State<AppState>) -> Json<Vec<ActiveScan>> {
    let active = state.active_scans.read().await;
    let mut scans: Vec<ActiveScan> = active
        .iter()
        .map(|(collection, scan_id)| ActiveScan {
            scan_id: *scan_id,
            collection: collection.clone(),
        })
        .collect();
    scans.sort_by(|a, b| a.collection.cmp(&b.collection));
    Json(scans)
}

/// Build scan routes
pub fn scan_routes() -> Router<AppState> {
    Router::new().route("/scans", post(start_scan).get(list_scans))
}
