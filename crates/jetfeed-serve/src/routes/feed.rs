//! Feed generator XRPC endpoints.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Page size when the client sends none.
pub const DEFAULT_LIMIT: i64 = 50;

/// Query parameters for `getFeedSkeleton`.
#[derive(Debug, Clone, Deserialize)]
pub struct SkeletonQuery {
    /// Feed-generator URI or bare feed name.
    pub feed: Option<String>,
    /// `time_us` of the last post already seen.
    pub cursor: Option<String>,
    /// Page size (default: 50, max: 100).
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkeletonItem {
    pub post: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkeletonResponse {
    pub feed: Vec<SkeletonItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `GET /xrpc/app.bsky.feed.getFeedSkeleton`
///
/// Returns post references, newest first, strictly older than `cursor`.
pub async fn get_feed_skeleton(
    State(state): State<AppState>,
    Query(params): Query<SkeletonQuery>,
) -> Result<Json<SkeletonResponse>, ApiError> {
    let feed = params
        .feed
        .as_deref()
        .filter(|feed| !feed.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("missing required parameter 'feed'".into()))?;

    let limit = match params.limit.as_deref() {
        None | Some("") => DEFAULT_LIMIT,
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ApiError::InvalidRequest(format!("invalid limit '{raw}': must be a positive integer"))
        })?,
    };

    // Requests are not authenticated, so every requester is anonymous.
    let page = state.pages.get_page(
        feed,
        None,
        limit,
        params.cursor.as_deref().unwrap_or(""),
        jetfeed_core::now_us(),
    )?;

    Ok(Json(SkeletonResponse {
        feed: page
            .posts
            .into_iter()
            .map(|post| SkeletonItem { post })
            .collect(),
        cursor: page.cursor,
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct DescribedFeed {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescribeResponse {
    pub did: String,
    pub feeds: Vec<DescribedFeed>,
}

/// `GET /xrpc/app.bsky.feed.describeFeedGenerator`
pub async fn describe_feed_generator(State(state): State<AppState>) -> Json<DescribeResponse> {
    Json(DescribeResponse {
        did: state.config.service_did.clone(),
        feeds: state
            .pages
            .describe()
            .into_iter()
            .map(|uri| DescribedFeed { uri })
            .collect(),
    })
}
