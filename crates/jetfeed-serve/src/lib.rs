//! Jetfeed Serve - feed skeleton HTTP API
//!
//! This crate serves the matches recorded by the ingest pipeline as
//! `app.bsky.feed.getFeedSkeleton` pages. Pagination is keyset-based on the
//! same microsecond cursor the pipeline checkpoints with.
//!
//! # Architecture
//!
//! - **FeedPages**: Resolves feeds and reads pages from the match store
//! - **AppState**: Shared application state (feed pages, configuration)
//! - **Routes**: Health check and the XRPC feed endpoints
//! - **Server**: Listener with request tracing and graceful shutdown

mod error;
pub mod feed;
mod routes;
mod server;
mod state;

pub use self::error::ApiError;
pub use self::feed::{FeedPage, FeedPages};
pub use self::routes::{DEFAULT_LIMIT, router};
pub use self::server::{app, serve, serve_on};
pub use self::state::{AppState, Config};
