//! Fan-out of stream events to filters.

use jetfeed_core::metrics::{CONSUMER_EVENTS, CONSUMER_POSTS};
use jetfeed_core::{Error, Event, POST_COLLECTION, Post, Result};

use crate::cursor::SharedCursor;
use crate::filter::Filter;

/// Hands each in-scope post to every filter, then advances the cursor.
///
/// Events must be handled one at a time in stream order. The cursor only
/// moves after an event was fully handled, so a failed event is redelivered
/// after a restart and filters see it again.
pub struct Dispatcher {
    filters: Vec<Filter>,
    cursor: SharedCursor,
    post_collection: String,
}

impl Dispatcher {
    pub fn new(filters: Vec<Filter>, cursor: SharedCursor) -> Self {
        Self {
            filters,
            cursor,
            post_collection: POST_COLLECTION.to_string(),
        }
    }

    /// Override the collection treated as posts.
    pub fn with_post_collection(mut self, collection: impl Into<String>) -> Self {
        self.post_collection = collection.into();
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn cursor(&self) -> &SharedCursor {
        &self.cursor
    }

    pub fn handle_event(&self, event: &Event) -> Result<()> {
        metrics::counter!(CONSUMER_EVENTS).increment(1);

        if event.writes_to(&self.post_collection) {
            let post = Post::from_event(event).map_err(|e| match e {
                Error::Decode(msg) => Error::Decode(format!(
                    "post {}/{} at {}: {msg}",
                    event.actor_id, event.record_key, event.time_us
                )),
                other => other,
            })?;
            metrics::counter!(CONSUMER_POSTS).increment(1);

            for filter in &self.filters {
                filter.handle_post(event, &post)?;
            }
        }

        self.cursor.set(event.time_us);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{EnglishTextFilter, FeedWriter, FilterKind};
    use jetfeed_core::{MatchStore, Operation};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn post(time_us: i64, rkey: &str, body: &str) -> Event {
        Event::commit(
            time_us,
            "did:plc:alice",
            Operation::Create,
            POST_COLLECTION,
            rkey,
            Some(body.as_bytes().to_vec()),
        )
    }

    const ENGLISH: &str = r#"{"text":"hello world","langs":["en"]}"#;
    const COMPOSER: &str = r#"{"text":"see example com","langs":["en"],"embed":{"$type":"app.bsky.embed.external","external":{"uri":"https://example.com"}}}"#;
    const NEITHER: &str = r#"{"text":"bonjour","langs":["fr"]}"#;

    fn dispatcher(store: &Arc<MatchStore>) -> Dispatcher {
        let filters =
            Filter::from_names(&["composer-errors", "english-text"], Arc::clone(store)).unwrap();
        Dispatcher::new(filters, SharedCursor::new(0))
    }

    fn all_matches(store: &MatchStore) -> BTreeSet<(String, i64, String)> {
        FilterKind::ALL
            .iter()
            .flat_map(|kind| store.matches_before(kind.name(), i64::MAX, 100).unwrap())
            .map(|m| (m.feed_name, m.time_us, m.record_key))
            .collect()
    }

    #[test]
    fn test_records_matches_and_advances_cursor() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        let d = dispatcher(&store);

        d.handle_event(&post(10, "a", ENGLISH)).unwrap();
        assert_eq!(d.cursor().get(), 10);
        d.handle_event(&post(20, "b", COMPOSER)).unwrap();
        assert_eq!(d.cursor().get(), 20);
        d.handle_event(&post(30, "c", NEITHER)).unwrap();
        assert_eq!(d.cursor().get(), 30);

        let expected: BTreeSet<_> = [
            ("english-text".to_string(), 10, "a".to_string()),
            ("composer-errors".to_string(), 20, "b".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(all_matches(&store), expected);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        let d = dispatcher(&store);
        let events = vec![
            post(10, "a", ENGLISH),
            post(20, "b", COMPOSER),
            post(30, "c", NEITHER),
            post(40, "d", ENGLISH),
        ];

        for event in &events {
            d.handle_event(event).unwrap();
        }
        let once = all_matches(&store);

        for event in &events {
            d.handle_event(event).unwrap();
        }
        assert_eq!(all_matches(&store), once);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_decode_failure_leaves_cursor() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        let d = dispatcher(&store);

        d.handle_event(&post(10, "a", ENGLISH)).unwrap();
        let err = d.handle_event(&post(20, "bad", "{not json")).unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("did:plc:alice/bad")));
        assert_eq!(d.cursor().get(), 10);

        let missing = Event::commit(
            30,
            "did:plc:alice",
            Operation::Update,
            POST_COLLECTION,
            "nobody",
            None,
        );
        assert!(matches!(d.handle_event(&missing), Err(Error::Decode(_))));
        assert_eq!(d.cursor().get(), 10);
    }

    #[test]
    fn test_filter_store_error_stops_remaining_filters() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        let filters = vec![
            Filter::EnglishText(EnglishTextFilter::new(FeedWriter::new(
                "bad\0",
                Arc::clone(&store),
            ))),
            Filter::build(FilterKind::EnglishText, Arc::clone(&store)).unwrap(),
        ];
        let d = Dispatcher::new(filters, SharedCursor::new(7));
        assert_eq!(d.filters().len(), 2);
        assert_eq!(d.filters()[1].name(), "english-text");

        let err = d.handle_event(&post(10, "a", ENGLISH)).unwrap_err();
        assert!(matches!(err, Error::InvalidFeedName(_)));
        assert_eq!(d.cursor().get(), 7);
        assert!(
            store
                .matches_before("english-text", i64::MAX, 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_out_of_scope_events_advance_cursor() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        let d = dispatcher(&store);

        let like = Event::commit(
            5,
            "did:plc:alice",
            Operation::Create,
            "app.bsky.feed.like",
            "l",
            Some(b"not even json".to_vec()),
        );
        d.handle_event(&like).unwrap();
        assert_eq!(d.cursor().get(), 5);

        let delete = Event::commit(6, "did:plc:alice", Operation::Delete, POST_COLLECTION, "a", None);
        d.handle_event(&delete).unwrap();
        assert_eq!(d.cursor().get(), 6);
        assert!(all_matches(&store).is_empty());
    }

    #[test]
    fn test_custom_post_collection() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MatchStore::open(tmp.path()).unwrap());
        let d = dispatcher(&store).with_post_collection("com.example.note");

        let note = Event::commit(
            7,
            "did:plc:alice",
            Operation::Create,
            "com.example.note",
            "n",
            Some(ENGLISH.as_bytes().to_vec()),
        );
        d.handle_event(&note).unwrap();
        d.handle_event(&post(8, "p", ENGLISH)).unwrap();

        let rows = store.matches_before("english-text", i64::MAX, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record_key, "n");
    }
}
