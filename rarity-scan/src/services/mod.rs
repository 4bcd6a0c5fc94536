//! Scan pipeline services
//!
//! Leaf-first: collection sources and content fetching feed the per-item
//! metadata task, the scheduler drives that task over every id, and the
//! ranker turns the finished run into a ranked dataset. [`scan_runner`] wires
//! them together around the result cache.

pub mod collection_source;
pub mod content_fetcher;
pub mod metadata_task;
pub mod rarity_ranker;
pub mod scan_runner;
pub mod scheduler;

pub use collection_source::{
    BaseUriSource, CollectionSource, JsonRpcSource, RpcSourceProvider, SourceProvider,
};
pub use content_fetcher::{ContentFetcher, HttpContentFetcher, IpfsGateway};
pub use metadata_task::MetadataTask;
pub use rarity_ranker::{assign_ranks, rank_collection};
pub use scan_runner::{
    normalize_collection_key, run_collection, EventObserver, LogObserver, ScanDeps, ScanReport,
    ScanRequest,
};
pub use scheduler::{
    NoopObserver, Progress, ProgressStage, RunObserver, RunOutcome, RunSink, Scheduler,
    SchedulerConfig,
};
