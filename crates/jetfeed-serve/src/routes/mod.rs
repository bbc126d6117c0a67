//! API route definitions.

mod feed;
mod health;

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub use feed::DEFAULT_LIMIT;

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /health` - Health check
/// - `GET /xrpc/app.bsky.feed.getFeedSkeleton` - One page of a feed
/// - `GET /xrpc/app.bsky.feed.describeFeedGenerator` - Feeds served here
pub fn router(state: AppState) -> Router {
    let xrpc = Router::new()
        .route(
            "/app.bsky.feed.getFeedSkeleton",
            get(feed::get_feed_skeleton),
        )
        .route(
            "/app.bsky.feed.describeFeedGenerator",
            get(feed::describe_feed_generator),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/xrpc", xrpc)
        .with_state(state)
}
