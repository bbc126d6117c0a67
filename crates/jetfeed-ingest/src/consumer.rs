//! The ingest task: resume, subscribe, dispatch, checkpoint.

use std::sync::Arc;
use std::time::Duration;

use jetfeed_core::metrics::CONSUMER_RUNNING;
use jetfeed_core::{MatchStore, POST_COLLECTION, Result, ShutdownHandle};
use tracing::Instrument;

use crate::checkpoint::{CheckpointConfig, CheckpointLoop};
use crate::cursor::SharedCursor;
use crate::dispatcher::Dispatcher;
use crate::filter::Filter;
use crate::resume::resume_cursor;
use crate::source::{StreamSource, SubscribeOptions};

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Enabled filters, by registered name.
    pub feed_names: Vec<String>,
    /// Operator override for the resume position; 0 means unset.
    pub start_cursor: i64,
    /// Upper bound on how far back a stored-state resume may start.
    pub max_replay: Option<Duration>,
    pub checkpoint: CheckpointConfig,
    /// Collection whose records are decoded as posts.
    pub post_collection: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            feed_names: vec!["composer-errors".to_string()],
            start_cursor: 0,
            max_replay: None,
            checkpoint: CheckpointConfig::default(),
            post_collection: POST_COLLECTION.to_string(),
        }
    }
}

/// Summary of a consumer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub events_handled: u64,
    pub final_cursor: i64,
}

/// Consume `source` until it ends, `shutdown` fires, or an event fails.
///
/// Events are handled strictly one at a time. The checkpoint loop runs
/// alongside and always performs its final cursor write before this returns,
/// whether the run ended cleanly or with an error.
pub async fn run_consumer<S: StreamSource>(
    config: ConsumerConfig,
    store: Arc<MatchStore>,
    mut source: S,
    shutdown: ShutdownHandle,
) -> Result<ConsumerStats> {
    let filters = Filter::from_names(&config.feed_names, Arc::clone(&store))?;
    let feeds: Vec<String> = filters.iter().map(|f| f.name().to_string()).collect();

    let now = jetfeed_core::now_us();
    let resume = resume_cursor(&filters, config.start_cursor, config.max_replay, now)?;
    tracing::info!(
        source = source.name(),
        feeds = ?feeds,
        cursor = resume.cursor,
        from = %resume.source,
        lag_s = jetfeed_core::lag_seconds(resume.cursor, now),
        "starting consumer"
    );

    let cursor = SharedCursor::new(resume.cursor);
    source
        .subscribe(SubscribeOptions {
            cursor: resume.cursor,
            wanted_collections: vec![config.post_collection.clone()],
        })
        .await?;

    let stop_checkpoint = ShutdownHandle::new();
    let checkpoint = CheckpointLoop::new(
        Arc::clone(&store),
        feeds,
        cursor.clone(),
        source.stats(),
        config.checkpoint.clone(),
    );
    let checkpoint_task = tokio::spawn(checkpoint.run(stop_checkpoint.clone()).in_current_span());

    let dispatcher =
        Dispatcher::new(filters, cursor.clone()).with_post_collection(config.post_collection);

    metrics::gauge!(CONSUMER_RUNNING).set(1.0);
    let mut events_handled: u64 = 0;
    let result = loop {
        tokio::select! {
            biased;

            signal = shutdown.wait() => {
                tracing::info!(%signal, "stopping consumer");
                break Ok(());
            }
            next = source.next_event() => match next {
                Ok(Some(event)) => {
                    if let Err(e) = dispatcher.handle_event(&event) {
                        break Err(e);
                    }
                    events_handled += 1;
                }
                Ok(None) => {
                    tracing::info!("stream ended");
                    break Ok(());
                }
                Err(e) => break Err(e),
            },
        }
    };

    stop_checkpoint.shutdown();
    if let Err(e) = checkpoint_task.await {
        tracing::error!(error = %e, "checkpoint task failed");
    }
    metrics::gauge!(CONSUMER_RUNNING).set(0.0);

    let final_cursor = cursor.get();
    match result {
        Ok(()) => {
            tracing::info!(events_handled, final_cursor, "consumer stopped");
            Ok(ConsumerStats {
                events_handled,
                final_cursor,
            })
        }
        Err(e) => {
            tracing::error!(error = %e, events_handled, final_cursor, "consumer failed");
            Err(e)
        }
    }
}
