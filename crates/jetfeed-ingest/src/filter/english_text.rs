//! Short, plain, English text posts.
//!
//! The language check trusts the post's own `langs` tag, then rejects
//! anything that looks like it isn't plain prose: multiple lines, a high share
//! of non-ASCII characters, or emoji. The emoji table is an approximation and
//! not a full Unicode emoji database.

use jetfeed_core::Post;

use super::FeedWriter;

/// Highest accepted share of non-ASCII characters.
pub const MAX_NON_ASCII_RATIO: f64 = 0.2;

/// An inclusive range of code points.
#[derive(Debug, Clone, Copy)]
pub struct EmojiRange {
    pub start: u32,
    pub end: u32,
}

impl EmojiRange {
    const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, c: char) -> bool {
        (self.start..=self.end).contains(&(c as u32))
    }
}

pub const EMOJI_RANGES: &[EmojiRange] = &[
    // Miscellaneous Symbols
    EmojiRange::new(0x2600, 0x26FF),
    // Dingbats
    EmojiRange::new(0x2700, 0x27BF),
    // Stars and circles from Miscellaneous Symbols and Arrows
    EmojiRange::new(0x2B50, 0x2B55),
    // Variation selectors
    EmojiRange::new(0xFE00, 0xFE0F),
    // Mahjong through Symbols and Pictographs Extended-A
    EmojiRange::new(0x1F000, 0x1FFFF),
];

pub fn is_emoji(c: char) -> bool {
    EMOJI_RANGES.iter().any(|range| range.contains(c))
}

pub fn contains_emoji(text: &str) -> bool {
    text.chars().any(is_emoji)
}

/// Share of characters outside ASCII. Zero for empty text.
fn non_ascii_ratio(text: &str) -> f64 {
    let (total, non_ascii) = text.chars().fold((0usize, 0usize), |(total, non_ascii), c| {
        (total + 1, non_ascii + usize::from(!c.is_ascii()))
    });
    if total == 0 {
        return 0.0;
    }
    non_ascii as f64 / total as f64
}

pub struct EnglishTextFilter {
    feed: FeedWriter,
}

impl EnglishTextFilter {
    pub fn new(feed: FeedWriter) -> Self {
        Self { feed }
    }

    pub(super) fn feed(&self) -> &FeedWriter {
        &self.feed
    }

    pub fn matches(&self, post: &Post) -> bool {
        if post.has_embed()
            || post.is_reply
            || post.text.is_empty()
            || !post.facets.is_empty()
            || !post.has_language("en")
        {
            return false;
        }

        if post.text.contains('\n') {
            tracing::debug!(feed = %self.feed.name(), "rejected: multiline text");
            return false;
        }

        let ratio = non_ascii_ratio(&post.text);
        if ratio > MAX_NON_ASCII_RATIO {
            tracing::debug!(feed = %self.feed.name(), ratio, "rejected: non-ASCII ratio");
            return false;
        }

        if contains_emoji(&post.text) {
            tracing::debug!(feed = %self.feed.name(), "rejected: emoji");
            return false;
        }

        true
    }
}
