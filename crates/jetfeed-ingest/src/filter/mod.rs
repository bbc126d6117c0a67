//! Content filters.
//!
//! Each filter owns one feed: it decides whether a post belongs in that feed
//! and records matches in the [`MatchStore`] under its own name. Filters keep
//! no state between calls; everything durable lives in the store, so the
//! process can stop between any two events.
//!
//! The set of filters is closed. Adding one means adding a [`FilterKind`], a
//! [`Filter`] variant and its predicate module.

mod composer_errors;
mod english_text;

pub use composer_errors::ComposerErrorFilter;
pub use english_text::{EMOJI_RANGES, EmojiRange, EnglishTextFilter, contains_emoji, is_emoji};

use jetfeed_core::metrics::FEED_MATCHES;
use jetfeed_core::{Error, Event, FeedMatch, MatchStore, Post, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The registered filter implementations, addressed by name in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    ComposerErrors,
    EnglishText,
}

impl FilterKind {
    pub const ALL: [FilterKind; 2] = [FilterKind::ComposerErrors, FilterKind::EnglishText];

    /// Configuration name, also used as the feed name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ComposerErrors => "composer-errors",
            Self::EnglishText => "english-text",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                Error::Config(format!(
                    "unknown filter '{s}'. Valid options: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Write access to one feed's rows in the match store.
#[derive(Clone)]
pub struct FeedWriter {
    name: String,
    store: Arc<MatchStore>,
}

impl FeedWriter {
    pub fn new(name: impl Into<String>, store: Arc<MatchStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the feed's cursor row if it does not exist.
    pub fn initialize(&self) -> Result<()> {
        self.store.ensure_feed(&self.name)
    }

    /// Stored cursor of this feed, `None` if never checkpointed.
    pub fn latest_cursor(&self) -> Result<Option<i64>> {
        Ok(self
            .store
            .feed_state(&self.name)?
            .and_then(|state| state.latest_cursor))
    }

    /// Record `event` as a match of this feed. Redelivery is a no-op.
    pub fn record(&self, event: &Event) -> Result<()> {
        let created = self.store.upsert_match(&FeedMatch {
            feed_name: self.name.clone(),
            time_us: event.time_us,
            actor_id: event.actor_id.clone(),
            record_key: event.record_key.clone(),
        })?;
        if created {
            metrics::counter!(FEED_MATCHES, "feed" => self.name.clone()).increment(1);
        }
        Ok(())
    }
}

/// A registered filter.
pub enum Filter {
    ComposerErrors(ComposerErrorFilter),
    EnglishText(EnglishTextFilter),
}

impl Filter {
    /// Build the filter implementing `kind`, recording into the feed `kind.name()`.
    pub fn build(kind: FilterKind, store: Arc<MatchStore>) -> Result<Self> {
        let feed = FeedWriter::new(kind.name(), store);
        Ok(match kind {
            FilterKind::ComposerErrors => Self::ComposerErrors(ComposerErrorFilter::new(feed)?),
            FilterKind::EnglishText => Self::EnglishText(EnglishTextFilter::new(feed)),
        })
    }

    /// Build filters for the configured names, in the given order.
    pub fn from_names<S: AsRef<str>>(names: &[S], store: Arc<MatchStore>) -> Result<Vec<Self>> {
        let mut filters: Vec<Self> = Vec::with_capacity(names.len());
        for name in names {
            let kind: FilterKind = name.as_ref().parse()?;
            if filters.iter().any(|f| f.name() == kind.name()) {
                return Err(Error::Config(format!("filter '{kind}' configured twice")));
            }
            filters.push(Self::build(kind, Arc::clone(&store))?);
        }
        Ok(filters)
    }

    fn feed(&self) -> &FeedWriter {
        match self {
            Self::ComposerErrors(f) => f.feed(),
            Self::EnglishText(f) => f.feed(),
        }
    }

    /// Stable identifier; the filter's partition in the match store.
    pub fn name(&self) -> &str {
        self.feed().name()
    }

    /// Ensure the filter's cursor row exists. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        self.feed().initialize()
    }

    /// The filter's durably stored cursor.
    pub fn latest_cursor(&self) -> Result<Option<i64>> {
        self.feed().latest_cursor()
    }

    /// Pure predicate: does `post` belong in this feed?
    pub fn matches(&self, post: &Post) -> bool {
        match self {
            Self::ComposerErrors(f) => f.matches(post),
            Self::EnglishText(f) => f.matches(post),
        }
    }

    /// Evaluate `post` and record a match when the predicate holds.
    ///
    /// Returns whether the post matched. Store failures are returned to the
    /// caller and must halt processing of the event.
    pub fn handle_post(&self, event: &Event, post: &Post) -> Result<bool> {
        if !self.matches(post) {
            return Ok(false);
        }
        tracing::debug!(
            feed = %self.name(),
            did = %event.actor_id,
            rkey = %event.record_key,
            text = %post.text,
            "post matched"
        );
        self.feed().record(event)?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use jetfeed_core::{Embed, Event, Facet, FacetFeature, Operation, POST_COLLECTION, Post};

    pub fn post_event(time_us: i64, actor: &str, rkey: &str) -> Event {
        Event::commit(
            time_us,
            actor,
            Operation::Create,
            POST_COLLECTION,
            rkey,
            Some(br#"{"text":""}"#.to_vec()),
        )
    }

    pub fn english_post(text: &str) -> Post {
        Post {
            text: text.to_string(),
            languages: vec!["en".to_string()],
            ..Default::default()
        }
    }

    pub fn link_card_post(text: &str, uri: &str) -> Post {
        Post {
            text: text.to_string(),
            languages: vec!["en".to_string()],
            embed: Some(Embed::External {
                uri: uri.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn link_facet(uri: &str) -> Facet {
        Facet {
            features: vec![FacetFeature::Link {
                uri: uri.to_string(),
            }],
        }
    }
}
