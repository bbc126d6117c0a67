//! Keyset-paginated reads of a feed's matches.

use std::sync::Arc;

use jetfeed_core::metrics::FEED_PAGES;
use jetfeed_core::model::{FEED_GENERATOR_COLLECTION, RECORD_URI_SCHEME};
use jetfeed_core::{Error, MAX_PAGE_LIMIT, MatchStore, Result, feed_generator_uri};

/// One page of a feed skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPage {
    /// Post references, newest first.
    pub posts: Vec<String>,
    /// Cursor for the next page; `None` once the page came back empty.
    pub cursor: Option<String>,
}

/// Serves pages of the feeds published by one actor.
///
/// The cursor is the `time_us` of the last post a client has seen. A page
/// holds the posts strictly older than it, so a client walks backwards in
/// time and an empty cursor starts from the current time.
pub struct FeedPages {
    store: Arc<MatchStore>,
    feed_actor_did: String,
    feeds: Vec<String>,
}

impl FeedPages {
    pub fn new(
        store: Arc<MatchStore>,
        feed_actor_did: impl Into<String>,
        feeds: Vec<String>,
    ) -> Self {
        Self {
            store,
            feed_actor_did: feed_actor_did.into(),
            feeds,
        }
    }

    /// Map a feed reference to a served feed name.
    ///
    /// Accepts either the feed-generator URI
    /// (`at://<feed_actor_did>/app.bsky.feed.generator/<name>`) or a bare name.
    pub fn resolve_feed<'a>(&'a self, feed: &str) -> Result<&'a str> {
        let name = match feed
            .strip_prefix(RECORD_URI_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
        {
            Some(path) => {
                let mut parts = path.split('/');
                let (Some(did), Some(collection), Some(name), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(Error::InvalidFeedName(feed.to_string()));
                };
                if collection != FEED_GENERATOR_COLLECTION || name.is_empty() {
                    return Err(Error::InvalidFeedName(feed.to_string()));
                }
                if did != self.feed_actor_did {
                    return Err(Error::UnknownFeed(feed.to_string()));
                }
                name
            }
            None => feed,
        };

        self.feeds
            .iter()
            .find(|served| served.as_str() == name)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownFeed(feed.to_string()))
    }

    /// Fetch one page of `feed_name`.
    ///
    /// `requester` is accepted for logging only; every requester sees the
    /// same feed. `limit` must be positive and is capped at
    /// [`MAX_PAGE_LIMIT`]. An empty `cursor` means `now_us`; anything else
    /// must be a base-10 integer.
    pub fn get_page(
        &self,
        feed_name: &str,
        requester: Option<&str>,
        limit: i64,
        cursor: &str,
        now_us: i64,
    ) -> Result<FeedPage> {
        let feed_name = self.resolve_feed(feed_name)?;
        if limit <= 0 {
            return Err(Error::InvalidLimit(limit));
        }
        let before = if cursor.is_empty() {
            now_us
        } else {
            cursor.parse::<i64>().map_err(|e| Error::InvalidCursor {
                cursor: cursor.to_string(),
                reason: e.to_string(),
            })?
        };

        let limit = usize::try_from(limit).unwrap_or(MAX_PAGE_LIMIT);
        let rows = self.store.matches_before(feed_name, before, limit)?;
        metrics::counter!(FEED_PAGES, "feed" => feed_name.to_string()).increment(1);
        tracing::debug!(
            feed = %feed_name,
            requester = requester.unwrap_or("anonymous"),
            before,
            rows = rows.len(),
            "served page"
        );

        Ok(FeedPage {
            cursor: rows.last().map(|row| row.time_us.to_string()),
            posts: rows.iter().map(|row| row.post_uri()).collect(),
        })
    }

    /// Feed-generator URIs of every served feed.
    pub fn describe(&self) -> Vec<String> {
        self.feeds
            .iter()
            .map(|name| feed_generator_uri(&self.feed_actor_did, name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetfeed_core::FeedMatch;
    use tempfile::TempDir;

    const PUBLISHER: &str = "did:plc:publisher";
    const NOW: i64 = 1_000;

    fn pages(tmp: &TempDir) -> FeedPages {
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        for (time_us, rkey) in [(10, "a"), (20, "b"), (30, "c")] {
            store
                .upsert_match(&FeedMatch {
                    feed_name: "f".to_string(),
                    time_us,
                    actor_id: "did:plc:alice".to_string(),
                    record_key: rkey.to_string(),
                })
                .unwrap();
        }
        FeedPages::new(store, PUBLISHER, vec!["f".to_string(), "empty".to_string()])
    }

    #[test]
    fn test_pages_walk_backwards() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        let first = pages.get_page("f", None, 2, "", NOW).unwrap();
        assert_eq!(
            first.posts,
            vec![
                "at://did:plc:alice/app.bsky.feed.post/c",
                "at://did:plc:alice/app.bsky.feed.post/b",
            ]
        );
        assert_eq!(first.cursor.as_deref(), Some("20"));

        let second = pages.get_page("f", Some("did:plc:bob"), 2, "20", NOW).unwrap();
        assert_eq!(second.posts, vec!["at://did:plc:alice/app.bsky.feed.post/a"]);
        assert_eq!(second.cursor.as_deref(), Some("10"));

        let last = pages.get_page("f", None, 2, "10", NOW).unwrap();
        assert!(last.posts.is_empty());
        assert_eq!(last.cursor, None);
    }

    #[test]
    fn test_empty_cursor_is_bounded_by_now() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        let page = pages.get_page("f", None, 10, "", 25).unwrap();
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.cursor.as_deref(), Some("10"));
    }

    #[test]
    fn test_requester_does_not_change_results() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        let anonymous = pages.get_page("f", None, 3, "", NOW).unwrap();
        let signed_in = pages.get_page("f", Some("did:plc:bob"), 3, "", NOW).unwrap();
        assert_eq!(anonymous, signed_in);
    }

    #[test]
    fn test_malformed_cursor_rejected() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        let err = pages.get_page("f", None, 2, "abc", NOW).unwrap_err();
        assert!(matches!(err, Error::InvalidCursor { ref cursor, .. } if cursor == "abc"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        assert!(matches!(
            pages.get_page("f", None, 0, "", NOW),
            Err(Error::InvalidLimit(0))
        ));
        assert!(matches!(
            pages.get_page("f", None, -3, "", NOW),
            Err(Error::InvalidLimit(-3))
        ));
    }

    #[test]
    fn test_empty_feed_has_no_cursor() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        let page = pages.get_page("empty", None, 50, "", NOW).unwrap();
        assert!(page.posts.is_empty());
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn test_resolve_feed() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        assert_eq!(pages.resolve_feed("f").unwrap(), "f");
        assert_eq!(
            pages
                .resolve_feed("at://did:plc:publisher/app.bsky.feed.generator/f")
                .unwrap(),
            "f"
        );
        assert!(matches!(
            pages.resolve_feed("at://did:plc:other/app.bsky.feed.generator/f"),
            Err(Error::UnknownFeed(_))
        ));
        assert!(matches!(
            pages.resolve_feed("at://did:plc:publisher/app.bsky.feed.post/f"),
            Err(Error::InvalidFeedName(_))
        ));
        assert!(matches!(
            pages.resolve_feed("at://did:plc:publisher"),
            Err(Error::InvalidFeedName(_))
        ));
        assert!(matches!(
            pages.resolve_feed("unknown"),
            Err(Error::UnknownFeed(_))
        ));
    }

    #[test]
    fn test_describe() {
        let tmp = TempDir::new().unwrap();
        let pages = pages(&tmp);

        assert_eq!(
            pages.describe(),
            vec![
                "at://did:plc:publisher/app.bsky.feed.generator/f",
                "at://did:plc:publisher/app.bsky.feed.generator/empty",
            ]
        );
    }
}
