//! Application state and configuration.

use std::sync::Arc;
use std::time::Duration;

use jetfeed_core::MatchStore;

use crate::feed::FeedPages;

/// Feed server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:9072").
    pub bind_addr: String,

    /// DID of the account that publishes the feed-generator records.
    pub feed_actor_did: String,

    /// DID of this service (`did:web:<service host>`).
    pub service_did: String,

    /// Feeds served, by name.
    pub feeds: Vec<String>,

    /// How long in-flight requests may run after shutdown begins.
    pub shutdown_grace: Duration,
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub pages: Arc<FeedPages>,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<MatchStore>) -> Self {
        let pages = FeedPages::new(store, config.feed_actor_did.clone(), config.feeds.clone());
        tracing::info!(
            bind_addr = %config.bind_addr,
            service_did = %config.service_did,
            feeds = ?config.feeds,
            "feed server configured"
        );
        Self {
            pages: Arc::new(pages),
            config: Arc::new(config),
        }
    }
}
