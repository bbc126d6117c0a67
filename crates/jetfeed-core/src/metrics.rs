//! Prometheus metrics helpers for jetfeed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jetfeed_core::metrics::{init_metrics, start_metrics_server};
//!
//! let handle = init_metrics()?;
//! start_metrics_server(9090, handle).await?;
//!
//! metrics::counter!(jetfeed_core::metrics::CONSUMER_EVENTS).increment(1);
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`consumer_`, `checkpoint_`, `stream_`, `feed_`)
//! - Suffix: unit or type (`_total`, `_bytes`, `_seconds`)
//! - Labels: only `feed`, whose cardinality is the number of configured feeds

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Events handled by the dispatcher.
pub const CONSUMER_EVENTS: &str = "consumer_events_total";
/// Post records decoded by the dispatcher.
pub const CONSUMER_POSTS: &str = "consumer_posts_decoded_total";
/// Live stream position in microseconds.
pub const CONSUMER_CURSOR: &str = "consumer_cursor_us";
/// Wall-clock lag behind the stream position.
pub const CONSUMER_LAG: &str = "consumer_lag_seconds";
/// Whether the consumer is running (1) or stopped (0).
pub const CONSUMER_RUNNING: &str = "consumer_running";
/// New matches recorded, labelled by `feed`.
pub const FEED_MATCHES: &str = "feed_matches_total";
/// Feed pages served, labelled by `feed`.
pub const FEED_PAGES: &str = "feed_pages_served_total";
/// Per-feed cursor writes by the checkpoint loop.
pub const CHECKPOINT_WRITES: &str = "checkpoint_writes_total";
/// Failed per-feed cursor writes.
pub const CHECKPOINT_FAILURES: &str = "checkpoint_failures_total";
/// Events read from the stream source.
pub const STREAM_EVENTS_READ: &str = "stream_events_read_total";
/// Bytes read from the stream source.
pub const STREAM_BYTES_READ: &str = "stream_bytes_read_total";

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
/// Returns a handle for [`start_metrics_server`].
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(handle)
}

/// Start the Prometheus metrics HTTP server.
///
/// Binds `0.0.0.0:port` before returning, then serves `/metrics` from a
/// background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

/// Register descriptions for the metrics listed above.
///
/// Called automatically by [`init_metrics`].
fn register_metrics() {
    describe_counter!(CONSUMER_EVENTS, "Total events handled by the dispatcher");
    describe_counter!(CONSUMER_POSTS, "Post records decoded and offered to filters");
    describe_gauge!(CONSUMER_CURSOR, "Current stream cursor (microseconds since epoch)");
    describe_gauge!(
        CONSUMER_LAG,
        "Seconds between the wall clock and the current stream cursor"
    );
    describe_gauge!(
        CONSUMER_RUNNING,
        "Whether the consumer is currently running (1=yes, 0=no)"
    );
    describe_counter!(FEED_MATCHES, "New posts recorded into a feed (label: feed)");
    describe_counter!(FEED_PAGES, "Feed skeleton pages served (label: feed)");
    describe_counter!(CHECKPOINT_WRITES, "Feed cursor checkpoints written");
    describe_counter!(CHECKPOINT_FAILURES, "Feed cursor checkpoint writes that failed");
    describe_counter!(STREAM_EVENTS_READ, "Events read from the stream source");
    describe_counter!(STREAM_BYTES_READ, "Bytes read from the stream source");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        metrics::counter!(FEED_MATCHES, "feed" => "english-text").increment(1);
        metrics::gauge!(CONSUMER_LAG).set(1.5);
        register_metrics();
    }
}
