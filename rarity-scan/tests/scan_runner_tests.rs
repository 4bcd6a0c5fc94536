//! End-to-end scans against fake sources and an in-memory cache

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{
    base_source, document, FailingSource, FakeFetcher, RecordingObserver, COLLECTION,
};
use rarity_common::Error;
use rarity_scan::db::{MemoryRunStore, RunStore};
use rarity_scan::models::RunResult;
use rarity_scan::services::{
    run_collection, CollectionSource, IpfsGateway, NoopObserver, ScanDeps, ScanRequest,
};
use serde_json::json;

fn deps(
    source: Arc<dyn CollectionSource>,
    fetcher: Arc<FakeFetcher>,
    store: Arc<MemoryRunStore>,
) -> ScanDeps {
    ScanDeps {
        source,
        fetcher,
        gateway: IpfsGateway::default(),
        store,
    }
}

/// Five items: two share a rare hat, one has no attribute list
fn collection_fetcher() -> FakeFetcher {
    FakeFetcher::new()
        .with_document(1, document("one", &[("Hat", json!("Cap")), ("Eyes", json!("Red"))]))
        .with_document(2, document("two", &[("Hat", json!("Cap")), ("Eyes", json!("Blue"))]))
        .with_document(3, document("three", &[("Hat", json!("Crown")), ("Eyes", json!("Red"))]))
        .with_document(4, document("four", &[("Hat", json!("Cap"))]))
        .with_document(5, json!({ "name": "five", "description": "unrevealed" }))
}

fn request(concurrency: usize) -> ScanRequest {
    ScanRequest {
        collection: COLLECTION.to_string(),
        concurrency,
        max_attempts: 5,
        use_cache: true,
    }
}

#[tokio::test]
async fn test_scan_ranks_fetched_items_and_skips_unrevealed() {
    let fetcher = Arc::new(collection_fetcher().with_delay(Duration::from_millis(1)));
    let store = Arc::new(MemoryRunStore::new());
    let observer = RecordingObserver::default();

    let report = run_collection(
        &request(2),
        &deps(base_source(5), fetcher.clone(), store.clone()),
        &observer,
    )
    .await
    .unwrap();

    assert!(!report.from_cache);
    assert_eq!(report.supply, Some(5));
    assert!(report.abandoned.is_empty());
    assert_eq!(report.dataset.len(), 4);
    assert!(report.dataset.get(5).is_none());
    assert_eq!(report.dataset.items[0].id, 3);
    assert_eq!(report.dataset.items[0].rank, 1);

    assert_eq!(*observer.started.lock().unwrap(), Some((5, 2)));
    assert_eq!(fetcher.calls(), 5);
    assert!(fetcher.max_in_flight() <= 2);
    assert!(observer.errors().is_empty());

    let stored = store.load(COLLECTION).await.unwrap().unwrap();
    assert_eq!(stored.len(), 4);
    assert!(stored.is_consistent());
    assert_eq!(stored.total_attribute_instances, 3 + 3 + 3 + 2);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let fetcher = Arc::new(collection_fetcher().failing(2, 2).failing(4, 1));
    let store = Arc::new(MemoryRunStore::new());
    let observer = RecordingObserver::default();

    let report = run_collection(
        &request(3),
        &deps(base_source(5), fetcher.clone(), store),
        &observer,
    )
    .await
    .unwrap();

    assert_eq!(report.dataset.len(), 4);
    assert!(report.abandoned.is_empty());
    assert_eq!(fetcher.calls(), 5 + 3);

    let mut errors = observer.errors();
    errors.sort();
    assert_eq!(errors, vec![(2, true), (2, true), (4, true)]);
}

#[tokio::test]
async fn test_missing_document_is_abandoned_without_failing_the_scan() {
    // item 6 is beyond the hosted documents and answers 404 every time
    let fetcher = Arc::new(collection_fetcher());
    let store = Arc::new(MemoryRunStore::new());
    let observer = RecordingObserver::default();

    let report = run_collection(
        &request(4),
        &deps(base_source(6), fetcher.clone(), store),
        &observer,
    )
    .await
    .unwrap();

    assert_eq!(report.abandoned, vec![6]);
    assert_eq!(report.dataset.len(), 4);
    assert_eq!(fetcher.calls(), 6 + 4);

    let errors = observer.errors();
    assert_eq!(errors.len(), 5);
    assert_eq!(errors.last(), Some(&(6, false)));
}

#[tokio::test]
async fn test_cached_result_skips_fetching() {
    let store = Arc::new(MemoryRunStore::new());

    let first = run_collection(
        &request(2),
        &deps(base_source(5), Arc::new(collection_fetcher()), store.clone()),
        &NoopObserver,
    )
    .await
    .unwrap();

    let empty_host = Arc::new(FakeFetcher::new());
    let observer = RecordingObserver::default();
    let second = run_collection(
        &request(2),
        &deps(Arc::new(FailingSource), empty_host.clone(), store),
        &observer,
    )
    .await
    .unwrap();

    assert!(second.from_cache);
    assert_eq!(second.supply, None);
    assert_eq!(empty_host.calls(), 0);
    assert!(observer.started.lock().unwrap().is_none());
    assert_eq!(second.dataset, first.dataset);
}

#[tokio::test]
async fn test_collection_key_is_normalized() {
    let store = Arc::new(MemoryRunStore::new());
    let mut shouted = request(2);
    shouted.collection = format!("  {}  ", COLLECTION.to_uppercase().replace("0X", "0x"));

    let report = run_collection(
        &shouted,
        &deps(base_source(5), Arc::new(collection_fetcher()), store.clone()),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(report.collection_key, COLLECTION);
    assert!(store.load(COLLECTION).await.unwrap().is_some());
}

#[tokio::test]
async fn test_disabled_cache_clears_store_and_refetches() {
    let store = Arc::new(MemoryRunStore::new());
    store.store("0xother", &RunResult::new()).await.unwrap();
    store.store(COLLECTION, &RunResult::new()).await.unwrap();

    let fetcher = Arc::new(collection_fetcher());
    let mut no_cache = request(2);
    no_cache.use_cache = false;

    let report = run_collection(
        &no_cache,
        &deps(base_source(5), fetcher.clone(), store.clone()),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert!(!report.from_cache);
    assert_eq!(fetcher.calls(), 5);
    assert!(store.load("0xother").await.unwrap().is_none());
    assert_eq!(store.load(COLLECTION).await.unwrap().unwrap().len(), 4);
}

#[tokio::test]
async fn test_inconsistent_cached_result_is_rebuilt() {
    let store = Arc::new(MemoryRunStore::new());
    run_collection(
        &request(2),
        &deps(base_source(5), Arc::new(collection_fetcher()), store.clone()),
        &NoopObserver,
    )
    .await
    .unwrap();

    let mut tampered = store.load(COLLECTION).await.unwrap().unwrap();
    tampered.total_attribute_instances = 0;
    store.store(COLLECTION, &tampered).await.unwrap();

    let report = run_collection(
        &request(2),
        &deps(base_source(5), Arc::new(FakeFetcher::new()), store),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert!(report.from_cache);
    assert_eq!(report.dataset.total_attribute_instances, 11);
}

#[tokio::test]
async fn test_supply_failure_is_initialization_error() {
    let fetcher = Arc::new(collection_fetcher());
    let store = Arc::new(MemoryRunStore::new());

    let result = run_collection(
        &request(2),
        &deps(Arc::new(FailingSource), fetcher.clone(), store.clone()),
        &NoopObserver,
    )
    .await;

    assert!(matches!(result, Err(Error::Initialization(_))));
    assert_eq!(fetcher.calls(), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_any_work() {
    let fetcher = Arc::new(collection_fetcher());
    let store = Arc::new(MemoryRunStore::new());
    let scan_deps = deps(base_source(5), fetcher.clone(), store);

    let result = run_collection(&request(0), &scan_deps, &NoopObserver).await;
    assert!(matches!(result, Err(Error::Config(_))));

    let mut blank = request(2);
    blank.collection = "   ".to_string();
    let result = run_collection(&blank, &scan_deps, &NoopObserver).await;
    assert!(matches!(result, Err(Error::Config(_))));

    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_empty_collection_produces_empty_ranking() {
    let report = run_collection(
        &request(3),
        &deps(
            base_source(0),
            Arc::new(FakeFetcher::new()),
            Arc::new(MemoryRunStore::new()),
        ),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert!(report.dataset.is_empty());
    assert_eq!(report.supply, Some(0));
}
