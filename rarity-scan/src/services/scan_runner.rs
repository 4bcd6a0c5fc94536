//! Collection scan entry point
//!
//! [`run_collection`] resolves the collection supply, drives the metadata task
//! over every id with the scheduler, caches the run result and ranks it. With
//! the cache enabled a stored result short-circuits the fetch phase.

use std::sync::Arc;

use chrono::Utc;
use rarity_common::config::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS};
use rarity_common::{Error, EventBus, Result, ScanEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collection_source::CollectionSource;
use super::content_fetcher::{ContentFetcher, IpfsGateway};
use super::metadata_task::MetadataTask;
use super::rarity_ranker::rank_collection;
use super::scheduler::{Progress, ProgressStage, RunObserver, Scheduler, SchedulerConfig};
use crate::db::RunStore;
use crate::error::FetchError;
use crate::models::{RankedDataset, RunResult};

/// Parameters of one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Collection identifier (contract address)
    pub collection: String,
    pub concurrency: usize,
    pub max_attempts: u32,
    /// Reuse a stored result; when false the store is cleared first
    pub use_cache: bool,
}

impl ScanRequest {
    /// Request with default concurrency, retry budget and caching
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            use_cache: true,
        }
    }
}

/// Collaborators a scan runs against
#[derive(Clone)]
pub struct ScanDeps {
    pub source: Arc<dyn CollectionSource>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub gateway: IpfsGateway,
    pub store: Arc<dyn RunStore>,
}

/// Outcome of [`run_collection`]
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Normalized collection key the result is stored under
    pub collection_key: String,
    pub dataset: RankedDataset,
    /// Ids dropped after exhausting their attempts
    pub abandoned: Vec<u64>,
    pub from_cache: bool,
    /// Supply read from the source; `None` when served from the cache
    pub supply: Option<u64>,
}

/// Cache key for a collection: trimmed and lowercased
pub fn normalize_collection_key(collection: &str) -> Result<String> {
    let key = collection.trim().to_lowercase();
    if key.is_empty() {
        return Err(Error::Config("Collection identifier must not be empty".to_string()));
    }
    Ok(key)
}

/// Scan a collection and rank its items.
///
/// Fails before any item is fetched on invalid configuration or when the
/// supply cannot be read. Individual item failures never fail the scan; those
/// items are reported to `observer` and left out of the dataset.
pub async fn run_collection(
    request: &ScanRequest,
    deps: &ScanDeps,
    observer: &dyn RunObserver,
) -> Result<ScanReport> {
    let key = normalize_collection_key(&request.collection)?;
    let config = SchedulerConfig::new(request.concurrency, request.max_attempts)?;

    if request.use_cache {
        match deps.store.load(&key).await {
            Ok(Some(stored)) => {
                info!(collection = %key, items = stored.len(), "Using cached scan result");
                let run = stored.into_consistent();
                return Ok(ScanReport {
                    collection_key: key,
                    dataset: rank_collection(&run),
                    abandoned: Vec::new(),
                    from_cache: true,
                    supply: None,
                });
            }
            Ok(None) => debug!(collection = %key, "No cached scan result"),
            Err(e) => warn!(collection = %key, error = %e, "Failed to read cached scan result, fetching"),
        }
    } else if let Err(e) = deps.store.clear().await {
        warn!(error = %e, "Failed to clear result cache");
    }

    let supply = deps.source.total_supply().await.map_err(|e| {
        Error::Initialization(format!("Failed to read supply of {}: {}", key, e))
    })?;

    info!(collection = %key, supply, concurrency = config.concurrency, "Scanning collection");
    observer.on_run_started(supply, config.concurrency);

    let task = MetadataTask::new(
        Arc::clone(&deps.source),
        Arc::clone(&deps.fetcher),
        deps.gateway.clone(),
    );
    let task = &task;
    let outcome = Scheduler::new(config)
        .run(1..=supply, move |id| task.fetch_one(id), RunResult::new(), observer)
        .await;

    let run = outcome.sink;
    if !outcome.abandoned.is_empty() {
        warn!(
            collection = %key,
            abandoned = outcome.abandoned.len(),
            "Some items were abandoned after exhausting retries"
        );
    }

    if let Err(e) = deps.store.store(&key, &run).await {
        warn!(collection = %key, error = %e, "Failed to cache scan result");
    }

    let dataset = rank_collection(&run);
    info!(collection = %key, items = dataset.len(), "Scan complete");

    Ok(ScanReport {
        collection_key: key,
        dataset,
        abandoned: outcome.abandoned,
        from_cache: false,
        supply: Some(supply),
    })
}

/// Publishes run progress as [`ScanEvent`]s
pub struct EventObserver {
    bus: EventBus,
    scan_id: Uuid,
    collection: String,
}

impl EventObserver {
    pub fn new(bus: EventBus, scan_id: Uuid, collection: impl Into<String>) -> Self {
        Self {
            bus,
            scan_id,
            collection: collection.into(),
        }
    }
}

impl RunObserver for EventObserver {
    fn on_run_started(&self, supply: u64, concurrency: usize) {
        self.bus.emit_lossy(ScanEvent::ScanStarted {
            scan_id: self.scan_id,
            collection: self.collection.clone(),
            supply,
            concurrency,
            timestamp: Utc::now(),
        });
    }

    fn on_progress(&self, progress: &Progress) {
        let event = match progress.stage {
            ProgressStage::Dispatched => ScanEvent::ItemDispatched {
                scan_id: self.scan_id,
                token_id: progress.id,
                done: progress.done,
                queue_len: progress.queue_len,
                in_progress: progress.in_progress,
                timestamp: Utc::now(),
            },
            ProgressStage::Completed => ScanEvent::ItemCompleted {
                scan_id: self.scan_id,
                token_id: progress.id,
                done: progress.done,
                queue_len: progress.queue_len,
                in_progress: progress.in_progress,
                timestamp: Utc::now(),
            },
        };
        self.bus.emit_lossy(event);
    }

    fn on_error(&self, error: &FetchError, id: u64, retryable: bool) {
        self.bus.emit_lossy(ScanEvent::ItemFailed {
            scan_id: self.scan_id,
            token_id: id,
            error: error.to_string(),
            retryable,
            timestamp: Utc::now(),
        });
    }
}

/// Logs completion progress every `every` items
pub struct LogObserver {
    every: usize,
}

impl LogObserver {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RunObserver for LogObserver {
    fn on_run_started(&self, supply: u64, concurrency: usize) {
        info!(supply, concurrency, "Fetching item metadata");
    }

    fn on_progress(&self, progress: &Progress) {
        if progress.stage == ProgressStage::Completed && progress.done % self.every == 0 {
            info!(
                done = progress.done,
                queued = progress.queue_len,
                in_progress = progress.in_progress,
                "Progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collection_key() {
        assert_eq!(
            normalize_collection_key("  0xABCdef  ").unwrap(),
            "0xabcdef"
        );
        assert!(matches!(normalize_collection_key("   "), Err(Error::Config(_))));
    }

    #[test]
    fn test_request_defaults() {
        let request = ScanRequest::new("0xabc");
        assert_eq!(request.concurrency, 10);
        assert_eq!(request.max_attempts, 5);
        assert!(request.use_cache);
    }

    #[tokio::test]
    async fn test_event_observer_emits_progress_stages() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let scan_id = Uuid::new_v4();
        let observer = EventObserver::new(bus, scan_id, "0xabc");

        let mut progress = Progress {
            id: 4,
            done: 0,
            queue_len: 2,
            in_progress: 1,
            stage: ProgressStage::Dispatched,
        };
        observer.on_progress(&progress);
        progress.stage = ProgressStage::Completed;
        progress.done = 1;
        observer.on_progress(&progress);
        observer.on_error(&FetchError::Network("reset".to_string()), 5, false);

        assert_eq!(rx.recv().await.unwrap().event_type(), "ItemDispatched");
        assert_eq!(rx.recv().await.unwrap().event_type(), "ItemCompleted");
        match rx.recv().await.unwrap() {
            ScanEvent::ItemFailed {
                token_id,
                retryable,
                scan_id: id,
                ..
            } => {
                assert_eq!(token_id, 5);
                assert!(!retryable);
                assert_eq!(id, scan_id);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
