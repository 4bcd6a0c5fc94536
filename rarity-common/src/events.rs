//! Scan event types and broadcast bus
//!
//! Events are emitted while a collection scan runs and are fanned out to any
//! number of subscribers (the SSE endpoint, log sinks, tests). Delivery is
//! best-effort: a lagging subscriber loses the oldest events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scanner event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// Supply resolved, workers about to start
    ScanStarted {
        scan_id: Uuid,
        collection: String,
        supply: u64,
        concurrency: usize,
        timestamp: DateTime<Utc>,
    },

    /// A worker picked an item off the queue and started fetching it
    ItemDispatched {
        scan_id: Uuid,
        token_id: u64,
        done: usize,
        queue_len: usize,
        in_progress: usize,
        timestamp: DateTime<Utc>,
    },

    /// An item fetch finished successfully
    ItemCompleted {
        scan_id: Uuid,
        token_id: u64,
        done: usize,
        queue_len: usize,
        in_progress: usize,
        timestamp: DateTime<Utc>,
    },

    /// An item fetch failed; `retryable` is false once the item is abandoned
    ItemFailed {
        scan_id: Uuid,
        token_id: u64,
        error: String,
        retryable: bool,
        timestamp: DateTime<Utc>,
    },

    /// Ranking produced
    ScanCompleted {
        scan_id: Uuid,
        collection: String,
        items: usize,
        abandoned: usize,
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },

    /// Run rejected (configuration, initialization or store failure)
    ScanFailed {
        scan_id: Uuid,
        collection: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::ScanStarted { .. } => "ScanStarted",
            ScanEvent::ItemDispatched { .. } => "ItemDispatched",
            ScanEvent::ItemCompleted { .. } => "ItemCompleted",
            ScanEvent::ItemFailed { .. } => "ItemFailed",
            ScanEvent::ScanCompleted { .. } => "ScanCompleted",
            ScanEvent::ScanFailed { .. } => "ScanFailed",
        }
    }

    /// Scan this event belongs to
    pub fn scan_id(&self) -> Uuid {
        match self {
            ScanEvent::ScanStarted { scan_id, .. }
            | ScanEvent::ItemDispatched { scan_id, .. }
            | ScanEvent::ItemCompleted { scan_id, .. }
            | ScanEvent::ItemFailed { scan_id, .. }
            | ScanEvent::ScanCompleted { scan_id, .. }
            | ScanEvent::ScanFailed { scan_id, .. } => *scan_id,
        }
    }
}

/// Broadcast bus for [`ScanEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use rarity_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScanEvent,
    ) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
