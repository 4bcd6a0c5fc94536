//! Bounded-concurrency fetch scheduler
//!
//! Drives one fetch per id to a terminal state (success, or failure after
//! `max_attempts`) with a fixed number of worker loops. Workers are joined
//! futures on the calling task, so concurrency means outstanding I/O rather
//! than parallel threads. The run state sits behind a mutex that is never held
//! across a fetch.
//!
//! A worker exits once it observes an empty queue. A failed item is requeued
//! by the worker that ran it, and that worker keeps looping, so a requeued id
//! is never stranded. The run resolves when every worker has exited, which
//! implies the queue is empty and nothing is in flight.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;

use futures::future::join_all;
use rarity_common::config::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, MAX_CONCURRENCY};
use rarity_common::{Error, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::FetchError;

/// Worker count and retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Fixed number of worker loops (1..=MAX_CONCURRENCY)
    pub concurrency: usize,
    /// Attempts per id before it is abandoned (>= 1)
    pub max_attempts: u32,
}

impl SchedulerConfig {
    pub fn new(concurrency: usize, max_attempts: u32) -> Result<Self> {
        if concurrency == 0 || concurrency > MAX_CONCURRENCY {
            return Err(Error::Config(format!(
                "concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(Self {
            concurrency,
            max_attempts,
        })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Point in an item's lifecycle a progress report refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    /// Taken off the queue, fetch starting
    Dispatched,
    /// Fetch succeeded
    Completed,
}

/// Run counters at the moment of a progress report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub id: u64,
    /// Ids completed so far
    pub done: usize,
    pub queue_len: usize,
    pub in_progress: usize,
    pub stage: ProgressStage,
}

/// Receives progress and per-item failures while a run executes.
///
/// Called synchronously from worker loops; implementations must not block.
pub trait RunObserver: Send + Sync {
    /// Supply resolved, workers about to start
    fn on_run_started(&self, _supply: u64, _concurrency: usize) {}

    fn on_progress(&self, _progress: &Progress) {}

    /// `retryable` is false on the final attempt, after which the id is dropped
    fn on_error(&self, _error: &FetchError, _id: u64, _retryable: bool) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Destination for successful fetch outputs.
///
/// `accept` runs under the run-state lock together with the completion count,
/// so an output is folded in one step.
pub trait RunSink<T> {
    fn accept(&mut self, id: u64, output: T);
}

impl<T> RunSink<T> for Vec<(u64, T)> {
    fn accept(&mut self, id: u64, output: T) {
        self.push((id, output));
    }
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub sink: S,
    /// Ids that succeeded
    pub completed: usize,
    /// Ids dropped after exhausting their attempts, in abandonment order
    pub abandoned: Vec<u64>,
    /// Failed attempts across all ids
    pub failed_attempts: usize,
}

struct RunState<S> {
    queue: VecDeque<u64>,
    in_progress: HashSet<u64>,
    retry_counts: HashMap<u64, u32>,
    completed: usize,
    abandoned: Vec<u64>,
    failed_attempts: usize,
    sink: S,
}

impl<S> RunState<S> {
    fn new(ids: impl IntoIterator<Item = u64>, sink: S) -> Self {
        Self {
            queue: ids.into_iter().collect(),
            in_progress: HashSet::new(),
            retry_counts: HashMap::new(),
            completed: 0,
            abandoned: Vec::new(),
            failed_attempts: 0,
            sink,
        }
    }

    /// Pop the next id and mark it in flight
    fn next_id(&mut self) -> Option<u64> {
        while let Some(id) = self.queue.pop_front() {
            if self.in_progress.insert(id) {
                return Some(id);
            }
            warn!(id, "Item already in flight, dropping duplicate queue entry");
        }
        None
    }

    fn snapshot(&self, id: u64, stage: ProgressStage) -> Progress {
        Progress {
            id,
            done: self.completed,
            queue_len: self.queue.len(),
            in_progress: self.in_progress.len(),
            stage,
        }
    }

    /// Count a failed attempt, returning the attempts used by `id` so far
    fn record_failure(&mut self, id: u64) -> u32 {
        self.failed_attempts += 1;
        let attempts = self.retry_counts.entry(id).or_insert(0);
        *attempts += 1;
        *attempts
    }
}

/// Fixed-pool scheduler
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Fetch every id in `ids`, handing successes to `sink`.
    ///
    /// Resolves once every id has succeeded or been abandoned. Per-item
    /// failures never abort the run; they are reported to `observer`.
    pub async fn run<I, T, S, F, Fut>(
        &self,
        ids: I,
        fetch_one: F,
        sink: S,
        observer: &dyn RunObserver,
    ) -> RunOutcome<S>
    where
        I: IntoIterator<Item = u64>,
        F: Fn(u64) -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
        S: RunSink<T>,
    {
        let run_state = RunState::new(ids, sink);

        // Workers beyond the queue length would exit on their first lock
        let worker_count = self.config.concurrency.min(run_state.queue.len().max(1));
        info!(
            queued = run_state.queue.len(),
            workers = worker_count,
            max_attempts = self.config.max_attempts,
            "Starting fetch workers"
        );

        let state = Mutex::new(run_state);
        let workers = (0..worker_count)
            .map(|worker| self.worker_loop(worker, &state, &fetch_one, observer));
        join_all(workers).await;

        let state = state.into_inner();
        info!(
            completed = state.completed,
            abandoned = state.abandoned.len(),
            failed_attempts = state.failed_attempts,
            "All fetch workers finished"
        );

        RunOutcome {
            sink: state.sink,
            completed: state.completed,
            abandoned: state.abandoned,
            failed_attempts: state.failed_attempts,
        }
    }

    async fn worker_loop<T, S, F, Fut>(
        &self,
        worker: usize,
        state: &Mutex<RunState<S>>,
        fetch_one: &F,
        observer: &dyn RunObserver,
    ) where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
        S: RunSink<T>,
    {
        loop {
            let dispatched = {
                let mut state = state.lock().await;
                match state.next_id() {
                    Some(id) => state.snapshot(id, ProgressStage::Dispatched),
                    None => {
                        if state.in_progress.is_empty() {
                            debug!(worker, "Queue drained and nothing in flight");
                        } else {
                            debug!(
                                worker,
                                in_progress = state.in_progress.len(),
                                "Queue empty, worker exiting while siblings finish"
                            );
                        }
                        break;
                    }
                }
            };

            let id = dispatched.id;
            observer.on_progress(&dispatched);

            let result = fetch_one(id).await;

            let mut guard = state.lock().await;
            guard.in_progress.remove(&id);

            match result {
                Ok(output) => {
                    guard.completed += 1;
                    guard.sink.accept(id, output);
                    let progress = guard.snapshot(id, ProgressStage::Completed);
                    drop(guard);

                    debug!(worker, id, done = progress.done, "Item fetched");
                    observer.on_progress(&progress);
                }
                Err(err) => {
                    let attempts = guard.record_failure(id);
                    let retryable = attempts < self.config.max_attempts;
                    if retryable {
                        guard.queue.push_back(id);
                    } else {
                        guard.abandoned.push(id);
                    }
                    drop(guard);

                    if retryable {
                        warn!(worker, id, attempt = attempts, error = %err, "Item fetch failed, requeued");
                    } else {
                        error!(worker, id, attempts, error = %err, "Item fetch failed, retries exhausted");
                    }
                    observer.on_error(&err, id, retryable);
                }
            }
        }
    }
}
