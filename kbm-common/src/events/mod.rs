//! Event types for the KBM event system
//!
//! Provides shared event definitions and the EventBus used to report upload
//! progress and library changes to whatever front end is attached.

mod upload_types;

pub use upload_types::{FileOutcomeData, MutationKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// KBM event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to a UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KbEvent {
    /// Upload batch accepted and about to process its first file
    UploadBatchStarted {
        batch_id: Uuid,
        total_files: usize,
        timestamp: DateTime<Utc>,
    },

    /// Soft validation warning for one file; the file is still attempted
    UploadFileWarning {
        batch_id: Uuid,
        file_index: usize,
        file_name: String,
        warnings: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Byte-level progress within a single transfer
    ///
    /// Only emitted when the transport reports it.
    UploadTransferProgress {
        batch_id: Uuid,
        file_index: usize,
        bytes_sent: u64,
        bytes_total: u64,
        timestamp: DateTime<Utc>,
    },

    /// Overall batch progress, emitted after every terminal file
    ///
    /// `percentage` never decreases within a batch and reaches 100.0 only
    /// when every file is terminal.
    UploadProgress {
        batch_id: Uuid,
        completed: usize,
        total: usize,
        percentage: f32,
        /// File that just finished
        current_file: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// One file reached a terminal state
    UploadFileCompleted {
        batch_id: Uuid,
        file_index: usize,
        file_name: String,
        outcome: FileOutcomeData,
        timestamp: DateTime<Utc>,
    },

    /// Every file in the batch is terminal
    UploadBatchCompleted {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        cancelled: bool,
        timestamp: DateTime<Utc>,
    },

    /// A page fetch was applied to the library state
    LibraryPageLoaded {
        offset: u64,
        limit: u64,
        item_count: usize,
        total_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Local library state changed after a mutation
    LibraryMutated {
        kind: MutationKind,
        /// Number of entries affected locally
        affected: usize,
        timestamp: DateTime<Utc>,
    },

    /// Search results were applied
    SearchCompleted {
        query: String,
        hit_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl KbEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            KbEvent::UploadBatchStarted { .. } => "UploadBatchStarted",
            KbEvent::UploadFileWarning { .. } => "UploadFileWarning",
            KbEvent::UploadTransferProgress { .. } => "UploadTransferProgress",
            KbEvent::UploadProgress { .. } => "UploadProgress",
            KbEvent::UploadFileCompleted { .. } => "UploadFileCompleted",
            KbEvent::UploadBatchCompleted { .. } => "UploadBatchCompleted",
            KbEvent::LibraryPageLoaded { .. } => "LibraryPageLoaded",
            KbEvent::LibraryMutated { .. } => "LibraryMutated",
            KbEvent::SearchCompleted { .. } => "SearchCompleted",
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking emission
/// - Multiple independent subscribers
/// - Bounded buffering; slow subscribers lose the oldest events
///
/// # Examples
///
/// ```
/// use kbm_common::events::{EventBus, KbEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(KbEvent::SearchCompleted {
///     query: "refund".to_string(),
///     hit_count: 3,
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KbEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KbEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: KbEvent) -> Result<usize, broadcast::error::SendError<KbEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: KbEvent) {
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

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
