//! Stream events, decoded posts, and the rows the match store persists.
//!
//! Events arrive in the Jetstream JSON shape:
//!
//! ```text
//! {"did":"did:plc:…","time_us":1725911162329308,"kind":"commit",
//!  "commit":{"operation":"create","collection":"app.bsky.feed.post","rkey":"3l3q…","record":{…}}}
//! ```
//!
//! Only the envelope is parsed on receipt. The record body is kept as raw
//! bytes and decoded into a [`Post`] by the dispatcher, once, when the event
//! is in scope.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// Collection of post records.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Collection path used in feed-generator references.
pub const FEED_GENERATOR_COLLECTION: &str = "app.bsky.feed.generator";

/// URI scheme for record references.
pub const RECORD_URI_SCHEME: &str = "at";

/// Render the reference a feed skeleton returns for a matched post.
pub fn post_uri(actor_id: &str, record_key: &str) -> String {
    format!("{RECORD_URI_SCHEME}://{actor_id}/{POST_COLLECTION}/{record_key}")
}

/// Render the reference that identifies a feed published by `feed_actor_did`.
pub fn feed_generator_uri(feed_actor_did: &str, feed_name: &str) -> String {
    format!("{RECORD_URI_SCHEME}://{feed_actor_did}/{FEED_GENERATOR_COLLECTION}/{feed_name}")
}

/// Commit operation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Non-commit events (identity, account) and unrecognised operations.
    Other,
}

impl Operation {
    fn parse(s: &str) -> Self {
        match s {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Other,
        }
    }

    /// Whether the operation writes a record body.
    pub fn writes_record(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// One record from the event stream. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Microseconds since epoch; strictly increasing within the stream.
    pub time_us: i64,
    /// Repository owner (DID).
    pub actor_id: String,
    pub operation: Operation,
    /// Record namespace, empty for non-commit events.
    pub collection: String,
    /// Record key within the actor's collection.
    pub record_key: String,
    /// Raw record JSON, absent for deletes and non-commit events.
    pub record_body: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct WireEvent {
    did: String,
    time_us: i64,
    #[serde(default)]
    commit: Option<WireCommit>,
}

#[derive(Deserialize)]
struct WireCommit {
    operation: String,
    collection: String,
    rkey: String,
    #[serde(default)]
    record: Option<Box<RawValue>>,
}

impl Event {
    /// Build a commit event.
    pub fn commit(
        time_us: i64,
        actor_id: impl Into<String>,
        operation: Operation,
        collection: impl Into<String>,
        record_key: impl Into<String>,
        record_body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            time_us,
            actor_id: actor_id.into(),
            operation,
            collection: collection.into(),
            record_key: record_key.into(),
            record_body,
        }
    }

    /// Parse one Jetstream JSON message.
    pub fn from_json(line: &str) -> Result<Self> {
        let wire: WireEvent = serde_json::from_str(line)?;
        let event = match wire.commit {
            Some(commit) => Self {
                time_us: wire.time_us,
                actor_id: wire.did,
                operation: Operation::parse(&commit.operation),
                collection: commit.collection,
                record_key: commit.rkey,
                record_body: commit.record.map(|raw| raw.get().as_bytes().to_vec()),
            },
            None => Self {
                time_us: wire.time_us,
                actor_id: wire.did,
                operation: Operation::Other,
                collection: String::new(),
                record_key: String::new(),
                record_body: None,
            },
        };
        Ok(event)
    }

    /// Whether this event writes a record into `collection`.
    pub fn writes_to(&self, collection: &str) -> bool {
        self.operation.writes_record() && self.collection == collection
    }
}

/// Embedded content attached to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    /// Link card for an external URL.
    External { uri: String },
    /// Images, quotes, video and anything else.
    Other,
}

/// A rich-text annotation over a span of the post text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facet {
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetFeature {
    Link { uri: String },
    /// Mentions, tags and anything else.
    Other,
}

/// Decoded post record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    pub text: String,
    pub languages: Vec<String>,
    pub embed: Option<Embed>,
    pub is_reply: bool,
    pub facets: Vec<Facet>,
}

// Record fields may be present as `null`; that reads as empty, like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct WirePost {
    #[serde(default, deserialize_with = "null_as_default")]
    text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    langs: Vec<String>,
    #[serde(default)]
    embed: Option<WireEmbed>,
    #[serde(default)]
    reply: Option<IgnoredAny>,
    #[serde(default, deserialize_with = "null_as_default")]
    facets: Vec<WireFacet>,
}

#[derive(Deserialize)]
#[serde(tag = "$type")]
enum WireEmbed {
    #[serde(rename = "app.bsky.embed.external")]
    External { external: WireExternal },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireExternal {
    uri: String,
}

#[derive(Deserialize)]
struct WireFacet {
    #[serde(default, deserialize_with = "null_as_default")]
    features: Vec<WireFeature>,
}

#[derive(Deserialize)]
#[serde(tag = "$type")]
enum WireFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(other)]
    Other,
}

impl Post {
    /// Decode a post record body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let wire: WirePost = serde_json::from_slice(body)?;
        Ok(Self {
            text: wire.text,
            languages: wire.langs,
            embed: wire.embed.map(|embed| match embed {
                WireEmbed::External { external } => Embed::External { uri: external.uri },
                WireEmbed::Other => Embed::Other,
            }),
            is_reply: wire.reply.is_some(),
            facets: wire
                .facets
                .into_iter()
                .map(|facet| Facet {
                    features: facet
                        .features
                        .into_iter()
                        .map(|feature| match feature {
                            WireFeature::Link { uri } => FacetFeature::Link { uri },
                            WireFeature::Other => FacetFeature::Other,
                        })
                        .collect(),
                })
                .collect(),
        })
    }

    /// Decode the body of `event`, failing when the event carries none.
    pub fn from_event(event: &Event) -> Result<Self> {
        let body = event.record_body.as_deref().ok_or_else(|| {
            Error::Decode(format!(
                "{} {} has no record body",
                event.actor_id, event.record_key
            ))
        })?;
        Self::decode(body)
    }

    pub fn has_embed(&self) -> bool {
        self.embed.is_some()
    }

    /// URI of the external link card, if the embed is one.
    pub fn external_uri(&self) -> Option<&str> {
        match &self.embed {
            Some(Embed::External { uri }) => Some(uri),
            _ => None,
        }
    }

    /// Whether any facet already hyperlinks to `uri`.
    pub fn links_to(&self, uri: &str) -> bool {
        self.facets
            .iter()
            .flat_map(|facet| &facet.features)
            .any(|feature| matches!(feature, FacetFeature::Link { uri: link } if link == uri))
    }

    pub fn has_language(&self, tag: &str) -> bool {
        self.languages.iter().any(|lang| lang == tag)
    }
}

/// Durable per-feed progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursorState {
    pub feed_name: String,
    /// `None` until the first checkpoint for this feed.
    pub latest_cursor: Option<i64>,
}

/// A post a filter decided to keep.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedMatch {
    pub feed_name: String,
    pub time_us: i64,
    pub actor_id: String,
    pub record_key: String,
}

impl FeedMatch {
    pub fn post_uri(&self) -> String {
        post_uri(&self.actor_id, &self.record_key)
    }
}
