//! Process wiring: store, metrics, signals, consumer and feed server.

use std::sync::Arc;

use anyhow::{Context, Result};
use jetfeed_core::metrics::{init_metrics, start_metrics_server};
use jetfeed_core::shutdown::os_signal;
use jetfeed_core::{MatchStore, ShutdownHandle};
use jetfeed_ingest::{JsonlSource, run_consumer};
use jetfeed_serve::AppState;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::Config;

/// Run every enabled component until they finish or one of them fails.
///
/// A failing component, SIGINT or SIGTERM shuts the others down. The consumer
/// reaching the end of its input does not stop the feed server.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    config.log();

    if config.metrics_port > 0 {
        let handle = init_metrics().context("failed to install metrics recorder")?;
        start_metrics_server(config.metrics_port, handle)
            .await
            .context("failed to start metrics server")?;
    }

    let store = Arc::new(
        MatchStore::open(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
    );

    let shutdown = ShutdownHandle::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = os_signal() => match signal {
                    Ok(signal) => {
                        tracing::info!(%signal, "shutdown signal received, stopping gracefully");
                        shutdown.trigger(signal);
                    }
                    Err(e) => tracing::error!(error = %e, "failed to listen for signals"),
                },
                _ = shutdown.wait() => {}
            }
        });
    }

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    if config.consumer.enabled {
        let consumer_config = config.consumer_config();
        let source = JsonlSource::new(config.jsonl_config());
        let store = Arc::clone(&store);
        let shutdown = shutdown.clone();
        tasks.spawn(
            async move {
                run_consumer(consumer_config, store, source, shutdown)
                    .await
                    .context("consumer failed")?;
                Ok(())
            }
            .instrument(tracing::info_span!("component", component = "consumer")),
        );
    }

    if config.feedgen.enabled {
        let serve_config = config.serve_config()?;
        let bind_addr = serve_config.bind_addr.clone();
        let grace = serve_config.shutdown_grace;
        let state = AppState::new(serve_config, Arc::clone(&store));
        let shutdown = shutdown.clone();
        tasks.spawn(
            async move {
                jetfeed_serve::serve(state, &bind_addr, shutdown, grace)
                    .await
                    .with_context(|| format!("feed server on {bind_addr} failed"))
            }
            .instrument(tracing::info_span!("component", component = "feedgen")),
        );
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(anyhow::Error::from).and_then(|r| r);
        if let Err(e) = result {
            tracing::error!(error = ?e, "component failed, shutting down");
            shutdown.shutdown();
            first_error.get_or_insert(e);
        }
    }

    store.flush().context("failed to flush store")?;
    tracing::info!("shutdown complete");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
