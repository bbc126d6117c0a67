//! Periodic persistence of the live cursor into every feed's state.

use std::sync::Arc;
use std::time::Duration;

use jetfeed_core::metrics::{
    CHECKPOINT_FAILURES, CHECKPOINT_WRITES, CONSUMER_CURSOR, CONSUMER_LAG,
};
use jetfeed_core::{MatchStore, ShutdownHandle};
use tokio::time::MissedTickBehavior;

use crate::cursor::SharedCursor;
use crate::source::SourceStats;

#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Time between cursor writes.
    pub interval: Duration,
    /// Emit throughput stats every this many ticks.
    pub stats_every: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            stats_every: 5,
        }
    }
}

/// Writes the dispatcher's cursor into each feed's cursor row on a timer.
///
/// The snapshot is not transactional. A crash between two ticks replays at
/// most one interval of events on restart, which the idempotent match upserts
/// absorb.
pub struct CheckpointLoop {
    store: Arc<MatchStore>,
    feeds: Vec<String>,
    cursor: SharedCursor,
    source_stats: Arc<SourceStats>,
    config: CheckpointConfig,
}

impl CheckpointLoop {
    pub fn new(
        store: Arc<MatchStore>,
        feeds: Vec<String>,
        cursor: SharedCursor,
        source_stats: Arc<SourceStats>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            store,
            feeds,
            cursor,
            source_stats,
            config,
        }
    }

    /// Write the current cursor to every feed. Returns the cursor written.
    ///
    /// A failed write is logged and counted; the next tick tries again.
    pub fn persist(&self) -> i64 {
        let cursor = self.cursor.get();
        for feed in &self.feeds {
            match self.store.save_cursor(feed, cursor) {
                Ok(()) => metrics::counter!(CHECKPOINT_WRITES).increment(1),
                Err(e) => {
                    metrics::counter!(CHECKPOINT_FAILURES).increment(1);
                    tracing::error!(feed = %feed, cursor, error = %e, "failed to save cursor");
                }
            }
        }
        cursor
    }

    /// Log read throughput and lag, and update the gauges.
    pub fn report(&self, now_us: i64) {
        let cursor = self.cursor.get();
        let lag_s = jetfeed_core::lag_seconds(cursor, now_us);
        metrics::gauge!(CONSUMER_CURSOR).set(cursor as f64);
        metrics::gauge!(CONSUMER_LAG).set(lag_s);
        tracing::info!(
            events_read = self.source_stats.events_read(),
            bytes_read = self.source_stats.bytes_read(),
            avg_event_size = self.source_stats.avg_event_size(),
            latest_cursor = cursor,
            lag_s,
            "stream stats"
        );
    }

    /// Run until `stop` fires, then persist once more.
    pub async fn run(self, stop: ShutdownHandle) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let stats_every = self.config.stats_every.max(1);
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = stop.wait() => break,
                _ = ticker.tick() => {
                    self.persist();
                    ticks += 1;
                    if ticks.is_multiple_of(stats_every) {
                        self.report(jetfeed_core::now_us());
                    }
                }
            }
        }

        let cursor = self.persist();
        if let Err(e) = self.store.flush() {
            tracing::error!(error = %e, "failed to flush store");
        }
        tracing::info!(cursor, "checkpoint loop shut down");
    }
}
