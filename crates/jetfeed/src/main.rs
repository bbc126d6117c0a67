//! Jetfeed - Jetstream feed generator.
//!
//! Consumes a Jetstream event stream, records posts matching each enabled
//! filter, and serves the results as Bluesky feed skeletons.
//!
//! # Usage
//!
//! ```bash
//! # Replay a recorded stream and serve the feeds
//! jetfeed --consumer-input ./jetstream.jsonl --feed-names composer-errors,english-text \
//!     --feedgen-enabled true --feed-actor-did did:plc:... \
//!     --service-endpoint https://feeds.example.com
//!
//! # Pipe a live stream in
//! websocat wss://jetstream2.us-east.bsky.network/subscribe | jetfeed
//! ```
//!
//! # Graceful Shutdown
//!
//! SIGINT (Ctrl+C) and SIGTERM stop the consumer, write every feed's cursor a
//! final time, and let in-flight HTTP requests finish within the grace period.

mod app;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment from .env must be in place before clap reads env fallbacks.
    let dotenv = std::env::var("DOTENV_PATH").unwrap_or_else(|_| ".env".to_string());
    if std::path::Path::new(&dotenv).exists() {
        dotenvy::from_path(&dotenv).with_context(|| format!("failed to load {dotenv}"))?;
    }

    let config = Config::parse();
    init_tracing(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "jetfeed starting");
    app::run(config).await
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level '{}'", config.log_level))?,
    };

    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    Ok(())
}
