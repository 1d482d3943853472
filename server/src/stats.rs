//! Ingest counters for internal observability.
//!
//! Counters are updated by the stream handler and read by the debug server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters describing ingest activity since startup.
#[derive(Debug)]
pub struct IngestStats {
    started_at: DateTime<Utc>,
    streams_opened: AtomicU64,
    streams_closed: AtomicU64,
    stream_errors: AtomicU64,
    messages_received: AtomicU64,
    messages_ignored: AtomicU64,
    http_entries: AtomicU64,
    callback_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// When the counters started.
    pub started_at: DateTime<Utc>,
    /// Streams accepted.
    pub streams_opened: u64,
    /// Streams that have ended, for any reason.
    pub streams_closed: u64,
    /// Streams that ended with a receive error or an aborting callback.
    pub stream_errors: u64,
    /// Streams currently open.
    pub streams_active: u64,
    /// Messages received over all streams.
    pub messages_received: u64,
    /// Messages whose payload variant is not handled.
    pub messages_ignored: u64,
    /// HTTP entries dispatched to callbacks.
    pub http_entries: u64,
    /// Callback invocations that reported an error.
    pub callback_failures: u64,
}

impl IngestStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            streams_opened: AtomicU64::new(0),
            streams_closed: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            http_entries: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
        }
    }

    /// Records a newly accepted stream and returns its id.
    pub fn stream_opened(&self) -> u64 {
        self.streams_opened.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records the end of a stream.
    pub fn stream_closed(&self, failed: bool) {
        self.streams_closed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.stream_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a received message.
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a message with an unhandled payload variant.
    pub fn message_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an HTTP entry handed to the callbacks.
    pub fn http_entry(&self) {
        self.http_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records callback failures.
    pub fn callback_failures(&self, count: u64) {
        self.callback_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let streams_opened = self.streams_opened.load(Ordering::Relaxed);
        let streams_closed = self.streams_closed.load(Ordering::Relaxed);

        StatsSnapshot {
            started_at: self.started_at,
            streams_opened,
            streams_closed,
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            streams_active: streams_opened.saturating_sub(streams_closed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
            http_entries: self.http_entries.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}
