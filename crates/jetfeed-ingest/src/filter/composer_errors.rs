//! Posts where the composer attached a link card for a domain typed as words.
//!
//! Someone writes "example com" instead of "example.com"; the composer still
//! builds a link card for `https://example.com`, but the text carries no link
//! facet for it. These posts end up with a dead-looking domain in the text.

use jetfeed_core::{Error, Post, Result};
use regex::Regex;

use super::FeedWriter;

/// Bare `https://label.tld` with no path, query or fragment.
const BARE_HOST_PATTERN: &str = r"^https://(([A-Za-z0-9-]+)\.([A-Za-z0-9]+))$";

pub struct ComposerErrorFilter {
    feed: FeedWriter,
    bare_host: Regex,
}

impl ComposerErrorFilter {
    pub fn new(feed: FeedWriter) -> Result<Self> {
        let bare_host = Regex::new(BARE_HOST_PATTERN)
            .map_err(|e| Error::Config(format!("bad bare host pattern: {e}")))?;
        Ok(Self { feed, bare_host })
    }

    pub(super) fn feed(&self) -> &FeedWriter {
        &self.feed
    }

    pub fn matches(&self, post: &Post) -> bool {
        let Some(uri) = post.external_uri() else {
            return false;
        };
        let Some(captures) = self.bare_host.captures(uri) else {
            return false;
        };
        if post.links_to(uri) {
            return false;
        }

        let (Some(label), Some(tld)) = (captures.get(2), captures.get(3)) else {
            return false;
        };
        let spaced = format!("{} {}", label.as_str(), tld.as_str());
        post.text.contains(&spaced)
    }
}
