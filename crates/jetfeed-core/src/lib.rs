//! Core types, storage and shared plumbing for the jetfeed feed generator.
//!
//! This crate provides:
//! - The stream event and post data model, decoded from Jetstream JSON
//! - The RocksDB-backed [`MatchStore`] holding feed cursors and feed matches
//! - Prometheus metrics helpers
//! - A cooperative [`ShutdownHandle`]
//! - Shared error types

mod error;
pub mod metrics;
pub mod model;
pub mod shutdown;
pub mod store;

pub use error::{Error, Result};
pub use model::{
    Embed, Event, Facet, FacetFeature, FeedCursorState, FeedMatch, Operation, POST_COLLECTION,
    Post, feed_generator_uri, post_uri,
};
pub use shutdown::{ShutdownHandle, ShutdownSignal};
pub use store::{MAX_PAGE_LIMIT, MatchStore};

/// Current wall-clock time in the cursor domain (microseconds since epoch).
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Seconds between `now_us` and `cursor`, both in microseconds.
pub fn lag_seconds(cursor: i64, now_us: i64) -> f64 {
    (now_us - cursor) as f64 / 1_000_000.0
}
