//! Test doubles for collection sources, content fetching and run observation
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rarity_scan::error::FetchError;
use rarity_scan::services::{
    BaseUriSource, CollectionSource, ContentFetcher, Progress, RunObserver, SourceProvider,
};
use serde_json::{json, Value};

/// Base URI the fake collections live under
pub const BASE_URI: &str = "https://meta.test/collection";

/// Collection address used across tests
pub const COLLECTION: &str = "0x8a90cab2b38dba80c64b7734e58ee1db38b8992e";

/// Metadata URI of item `id`
pub fn item_uri(id: u64) -> String {
    format!("{}/{}", BASE_URI, id)
}

/// Metadata document with the given attributes
pub fn document(name: &str, attributes: &[(&str, Value)]) -> Value {
    let attributes: Vec<Value> = attributes
        .iter()
        .map(|(trait_type, value)| json!({ "trait_type": trait_type, "value": value }))
        .collect();
    json!({
        "name": name,
        "image": format!("ipfs://QmImages/{}.png", name),
        "attributes": attributes,
    })
}

/// In-memory metadata host with scripted failures
#[derive(Default)]
pub struct FakeFetcher {
    documents: HashMap<String, Value>,
    failures: Mutex<HashMap<String, u32>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, id: u64, document: Value) -> Self {
        self.documents.insert(item_uri(id), document);
        self
    }

    /// Fail the first `times` fetches of item `id`
    pub fn failing(self, id: u64, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(item_uri(id), times);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch_json(&self, uri: &str) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(uri) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Network(format!("connection reset: {}", uri)));
                }
            }
        }

        self.documents.get(uri).cloned().ok_or_else(|| FetchError::Http {
            status: 404,
            uri: uri.to_string(),
        })
    }
}

/// Source whose supply read always fails
pub struct FailingSource;

#[async_trait]
impl CollectionSource for FailingSource {
    async fn total_supply(&self) -> Result<u64, FetchError> {
        Err(FetchError::Rpc("execution reverted".to_string()))
    }

    async fn token_uri(&self, id: u64) -> Result<String, FetchError> {
        Ok(item_uri(id))
    }
}

/// Fixed-supply source at [`BASE_URI`]
pub fn base_source(supply: u64) -> Arc<dyn CollectionSource> {
    Arc::new(BaseUriSource::new(BASE_URI, supply).unwrap())
}

/// Provider handing out [`base_source`] for every collection
pub struct FixedSourceProvider {
    pub supply: u64,
}

impl SourceProvider for FixedSourceProvider {
    fn source_for(
        &self,
        _collection: &str,
    ) -> rarity_common::Result<Arc<dyn CollectionSource>> {
        Ok(base_source(self.supply))
    }
}

/// Observer that records everything it is told
#[derive(Default)]
pub struct RecordingObserver {
    pub started: Mutex<Option<(u64, usize)>>,
    pub progress: Mutex<Vec<Progress>>,
    pub errors: Mutex<Vec<(u64, bool)>>,
}

impl RecordingObserver {
    pub fn errors(&self) -> Vec<(u64, bool)> {
        self.errors.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<Progress> {
        self.progress.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn on_run_started(&self, supply: u64, concurrency: usize) {
        *self.started.lock().unwrap() = Some((supply, concurrency));
    }

    fn on_progress(&self, progress: &Progress) {
        self.progress.lock().unwrap().push(*progress);
    }

    fn on_error(&self, _error: &FetchError, id: u64, retryable: bool) {
        self.errors.lock().unwrap().push((id, retryable));
    }
}
