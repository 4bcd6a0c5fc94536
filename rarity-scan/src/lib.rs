//! rarity-scan library interface
//!
//! Collection rarity scanner: fetches every item's metadata with a bounded
//! worker pool, counts attribute values and ranks items by rarity. Exposed as
//! a library for the binary and for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod services;

pub use crate::error::{ApiError, ApiResult, FetchError};

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use rarity_common::config::TomlConfig;
use rarity_common::events::EventBus;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::db::RunStore;
use crate::models::RankedDataset;
use crate::services::{ContentFetcher, IpfsGateway, SourceProvider};

/// Scan settings applied when a request leaves them out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDefaults {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub use_cache: bool,
}

impl ScanDefaults {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            concurrency: config.scan.concurrency,
            max_attempts: config.scan.max_attempts,
            use_cache: config.store.use_cache,
        }
    }
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Result cache
    pub store: Arc<dyn RunStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Builds a collection source per scanned collection
    pub sources: Arc<dyn SourceProvider>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub gateway: IpfsGateway,
    pub defaults: ScanDefaults,
    /// Running scans by collection key
    pub active_scans: Arc<RwLock<HashMap<String, Uuid>>>,
    /// Running scan that clears the cache; excludes every other scan.
    /// Only changed while `active_scans` is write-locked.
    pub cache_clearing_scan: Arc<RwLock<Option<Uuid>>>,
    /// Ranked datasets of finished scans by collection key
    pub datasets: Arc<RwLock<HashMap<String, Arc<RankedDataset>>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RunStore>,
        event_bus: EventBus,
        sources: Arc<dyn SourceProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        gateway: IpfsGateway,
        defaults: ScanDefaults,
    ) -> Self {
        Self {
            store,
            event_bus,
            sources,
            fetcher,
            gateway,
            defaults,
            active_scans: Arc::new(RwLock::new(HashMap::new())),
            cache_clearing_scan: Arc::new(RwLock::new(None)),
            datasets: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::scan_routes())
        .merge(api::ranking_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
