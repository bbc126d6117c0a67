//! Stream source adapters.
//!
//! A source delivers [`Event`]s in increasing `time_us` order, starting from
//! the cursor it was subscribed with. Transport concerns (framing,
//! reconnection) belong to the source; the consumer only sees events.
//!
//! # Available Sources
//!
//! - [`JsonlSource`] - Reads Jetstream JSON lines from files or stdin
//! - [`MemorySource`] - Serves a fixed list of events, for tests and replays

mod jsonl;
mod memory;

pub use jsonl::{JsonlConfig, JsonlSource};
pub use memory::MemorySource;

use jetfeed_core::metrics::{STREAM_BYTES_READ, STREAM_EVENTS_READ};
use jetfeed_core::{Event, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Where a subscription starts and what it carries.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// First `time_us` to deliver.
    pub cursor: i64,
    /// Commit collections to deliver. Empty means all. Events without a
    /// collection (identity, account) are always delivered.
    pub wanted_collections: Vec<String>,
}

impl SubscribeOptions {
    pub fn new(cursor: i64) -> Self {
        Self {
            cursor,
            wanted_collections: Vec::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.wanted_collections.push(collection.into());
        self
    }

    /// Whether the subscription delivers `event`.
    pub fn admits(&self, event: &Event) -> bool {
        if event.time_us < self.cursor {
            return false;
        }
        event.collection.is_empty()
            || self.wanted_collections.is_empty()
            || self.wanted_collections.contains(&event.collection)
    }
}

/// Read counters shared with the checkpoint loop.
#[derive(Debug, Default)]
pub struct SourceStats {
    events_read: AtomicU64,
    bytes_read: AtomicU64,
}

impl SourceStats {
    /// Count one message of `bytes` read from the transport.
    pub fn record(&self, bytes: usize) {
        let bytes = bytes as u64;
        self.events_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        metrics::counter!(STREAM_EVENTS_READ).increment(1);
        metrics::counter!(STREAM_BYTES_READ).increment(bytes);
    }

    pub fn events_read(&self) -> u64 {
        self.events_read.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Mean message size in bytes, zero before the first message.
    pub fn avg_event_size(&self) -> f64 {
        let events = self.events_read();
        if events == 0 {
            return 0.0;
        }
        self.bytes_read() as f64 / events as f64
    }
}

/// A source of stream events.
pub trait StreamSource: Send {
    /// Human-readable name for this source (used in logs).
    fn name(&self) -> &'static str;

    /// Start delivering from `options.cursor`. Must be called once before
    /// [`StreamSource::next_event`].
    fn subscribe(&mut self, options: SubscribeOptions) -> impl Future<Output = Result<()>> + Send;

    /// Next admitted event, or `None` when the stream has ended.
    ///
    /// Cancel-safe: dropping the future between events loses nothing.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<Event>>> + Send;

    /// Read counters for throughput reporting.
    fn stats(&self) -> Arc<SourceStats>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetfeed_core::{Operation, POST_COLLECTION};

    fn event(time_us: i64, collection: &str) -> Event {
        Event::commit(time_us, "did:plc:a", Operation::Create, collection, "k", None)
    }

    #[test]
    fn test_admits_from_cursor() {
        let options = SubscribeOptions::new(100);
        assert!(!options.admits(&event(99, POST_COLLECTION)));
        assert!(options.admits(&event(100, POST_COLLECTION)));
        assert!(options.admits(&event(101, "app.bsky.feed.like")));
    }

    #[test]
    fn test_admits_wanted_collections() {
        let options = SubscribeOptions::new(0).with_collection(POST_COLLECTION);
        assert!(options.admits(&event(1, POST_COLLECTION)));
        assert!(!options.admits(&event(1, "app.bsky.feed.like")));
        assert!(options.admits(&event(1, "")));
    }

    #[test]
    fn test_avg_event_size() {
        let stats = SourceStats::default();
        assert_eq!(stats.avg_event_size(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.events_read(), 2);
        assert_eq!(stats.bytes_read(), 400);
        assert_eq!(stats.avg_event_size(), 200.0);
    }
}
