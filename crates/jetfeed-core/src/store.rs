//! Match store backed by RocksDB.
//!
//! Holds the two logical tables of the feed generator: per-feed cursor state
//! and the matched posts. Each lives in its own column family, plus a third
//! column family that indexes matches by time for the read path.
//!
//! # Key Design
//!
//! ```text
//! feeds:       [feed_name]                                          -> [] | [cursor_be (8 bytes)]
//! feed_posts:  [feed_name 0x00 actor_id 0x00 record_key]            -> [time_key (8 bytes)]
//! feed_time:   [feed_name 0x00 time_key actor_id 0x00 record_key]   -> []
//! ```
//!
//! `time_key` is the microsecond timestamp with its sign bit flipped, stored
//! big-endian, so lexicographic key order equals numeric time order and a
//! reverse scan from `[feed_name 0x00 time_key(cursor)]` yields the newest
//! matches strictly older than the cursor.
//!
//! `feed_posts` is the uniqueness index: a match whose identity is already
//! present is left untouched, which makes redelivered events harmless.

use crate::error::{Error, Result};
use crate::model::{FeedCursorState, FeedMatch};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const CF_FEEDS: &str = "feeds";
const CF_FEED_POSTS: &str = "feed_posts";
const CF_FEED_TIME: &str = "feed_time";

const SEPARATOR: u8 = 0x00;

/// Largest page [`MatchStore::matches_before`] will return.
pub const MAX_PAGE_LIMIT: usize = 100;

/// RocksDB-backed store for feed cursor state and feed matches.
///
/// Thread-safe: share it via `Arc<MatchStore>` between the consumer, the
/// checkpoint loop and the HTTP handlers. Every write is a single keyed put
/// or an atomic batch, so concurrent writers need no extra coordination.
pub struct MatchStore {
    db: DBWithThreadMode<MultiThreaded>,
}

impl MatchStore {
    /// Open or create a match store at the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use jetfeed_core::MatchStore;
    ///
    /// let store = MatchStore::open("./data/feeds")?;
    /// store.ensure_feed("english-text")?;
    /// # Ok::<(), jetfeed_core::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening match store at {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_write_buffer_size(32 * 1024 * 1024); // 32MB write buffer
        opts.set_max_write_buffer_number(2);
        opts.increase_parallelism(num_cpus::get().min(4) as i32);

        let descriptors = [CF_FEEDS, CF_FEED_POSTS, CF_FEED_TIME]
            .into_iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(name, cf_opts)
            });

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Store(format!("missing column family '{name}'")))
    }

    /// Make sure a cursor row exists for `feed_name`, creating it with a null
    /// cursor if absent. Existing cursors are left untouched.
    pub fn ensure_feed(&self, feed_name: &str) -> Result<()> {
        validate_feed_name(feed_name)?;
        let feeds = self.cf(CF_FEEDS)?;
        if self.db.get_cf(&feeds, feed_name.as_bytes())?.is_none() {
            self.db.put_cf(&feeds, feed_name.as_bytes(), [])?;
            debug!(feed = %feed_name, "created feed cursor row");
        }
        Ok(())
    }

    /// Read the cursor state of one feed, `None` if the feed was never initialized.
    pub fn feed_state(&self, feed_name: &str) -> Result<Option<FeedCursorState>> {
        let feeds = self.cf(CF_FEEDS)?;
        match self.db.get_cf(&feeds, feed_name.as_bytes())? {
            Some(value) => Ok(Some(FeedCursorState {
                feed_name: feed_name.to_string(),
                latest_cursor: decode_cursor(feed_name, &value)?,
            })),
            None => Ok(None),
        }
    }

    /// Read the cursor state of every initialized feed, ordered by name.
    pub fn feed_states(&self) -> Result<Vec<FeedCursorState>> {
        let feeds = self.cf(CF_FEEDS)?;
        let mut states = Vec::new();
        for item in self.db.iterator_cf(&feeds, IteratorMode::Start) {
            let (key, value) = item?;
            let feed_name = String::from_utf8_lossy(&key).into_owned();
            let latest_cursor = decode_cursor(&feed_name, &value)?;
            states.push(FeedCursorState {
                feed_name,
                latest_cursor,
            });
        }
        Ok(states)
    }

    /// Overwrite the latest cursor of `feed_name`.
    pub fn save_cursor(&self, feed_name: &str, cursor: i64) -> Result<()> {
        validate_feed_name(feed_name)?;
        let feeds = self.cf(CF_FEEDS)?;
        self.db
            .put_cf(&feeds, feed_name.as_bytes(), cursor.to_be_bytes())?;
        Ok(())
    }

    /// Record a match unless one with the same (feed, actor, record) identity exists.
    ///
    /// Returns `true` if a new row was written. The uniqueness row and the
    /// time index row are written in one batch.
    pub fn upsert_match(&self, feed_match: &FeedMatch) -> Result<bool> {
        validate_feed_name(&feed_match.feed_name)?;
        let posts = self.cf(CF_FEED_POSTS)?;
        let by_time = self.cf(CF_FEED_TIME)?;

        let identity = post_key(feed_match);
        if self.db.get_cf(&posts, &identity)?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&posts, &identity, time_key(feed_match.time_us));
        batch.put_cf(&by_time, index_key(feed_match), []);
        self.db.write(batch)?;
        Ok(true)
    }

    /// Matches of `feed_name` with `time_us < cursor`, newest first.
    ///
    /// At most `min(limit, MAX_PAGE_LIMIT)` rows are returned.
    pub fn matches_before(
        &self,
        feed_name: &str,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<FeedMatch>> {
        validate_feed_name(feed_name)?;
        let limit = limit.min(MAX_PAGE_LIMIT);
        let mut matches = Vec::with_capacity(limit);
        if limit == 0 {
            return Ok(matches);
        }

        let by_time = self.cf(CF_FEED_TIME)?;
        let prefix = feed_prefix(feed_name);
        let mut seek = prefix.clone();
        seek.extend_from_slice(&time_key(cursor));

        let iter = self
            .db
            .iterator_cf(&by_time, IteratorMode::From(&seek, Direction::Reverse));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            matches.push(parse_index_key(feed_name, &key[prefix.len()..])?);
            if matches.len() == limit {
                break;
            }
        }

        Ok(matches)
    }

    /// Number of matches stored for `feed_name`.
    pub fn match_count(&self, feed_name: &str) -> Result<usize> {
        validate_feed_name(feed_name)?;
        let posts = self.cf(CF_FEED_POSTS)?;
        let prefix = feed_prefix(feed_name);
        let mut count = 0usize;
        let iter = self
            .db
            .iterator_cf(&posts, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Flush all column families to disk.
    pub fn flush(&self) -> Result<()> {
        for name in [CF_FEEDS, CF_FEED_POSTS, CF_FEED_TIME] {
            self.db.flush_cf(&self.cf(name)?)?;
        }
        Ok(())
    }
}

fn validate_feed_name(feed_name: &str) -> Result<()> {
    if feed_name.is_empty() || feed_name.as_bytes().contains(&SEPARATOR) {
        return Err(Error::InvalidFeedName(feed_name.to_string()));
    }
    Ok(())
}

fn decode_cursor(feed_name: &str, value: &[u8]) -> Result<Option<i64>> {
    match value.len() {
        0 => Ok(None),
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(value);
            Ok(Some(i64::from_be_bytes(bytes)))
        }
        n => Err(Error::Store(format!(
            "feed '{feed_name}' has a {n}-byte cursor value"
        ))),
    }
}

/// Timestamp encoding whose byte order matches numeric order.
fn time_key(time_us: i64) -> [u8; 8] {
    ((time_us as u64) ^ (1 << 63)).to_be_bytes()
}

fn parse_time_key(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

fn feed_prefix(feed_name: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(feed_name.len() + 1);
    prefix.extend_from_slice(feed_name.as_bytes());
    prefix.push(SEPARATOR);
    prefix
}

fn post_key(feed_match: &FeedMatch) -> Vec<u8> {
    let mut key = feed_prefix(&feed_match.feed_name);
    key.extend_from_slice(feed_match.actor_id.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(feed_match.record_key.as_bytes());
    key
}

fn index_key(feed_match: &FeedMatch) -> Vec<u8> {
    let mut key = feed_prefix(&feed_match.feed_name);
    key.extend_from_slice(&time_key(feed_match.time_us));
    key.extend_from_slice(feed_match.actor_id.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(feed_match.record_key.as_bytes());
    key
}

/// Parse the part of a `feed_time` key after the feed prefix.
fn parse_index_key(feed_name: &str, rest: &[u8]) -> Result<FeedMatch> {
    let corrupt = || Error::Store(format!("malformed index key in feed '{feed_name}'"));
    if rest.len() < 8 {
        return Err(corrupt());
    }
    let (time, identity) = rest.split_at(8);
    let mut time_bytes = [0u8; 8];
    time_bytes.copy_from_slice(time);

    let split = identity
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or_else(corrupt)?;
    let actor_id = std::str::from_utf8(&identity[..split]).map_err(|_| corrupt())?;
    let record_key = std::str::from_utf8(&identity[split + 1..]).map_err(|_| corrupt())?;

    Ok(FeedMatch {
        feed_name: feed_name.to_string(),
        time_us: parse_time_key(time_bytes),
        actor_id: actor_id.to_string(),
        record_key: record_key.to_string(),
    })
}
