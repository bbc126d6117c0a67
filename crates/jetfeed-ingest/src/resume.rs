//! Startup computation of the stream position to subscribe from.

use std::fmt;
use std::time::Duration;

use jetfeed_core::Result;

use crate::filter::Filter;

/// Where the resume position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    /// Operator-supplied start cursor.
    Override,
    /// Minimum of the feeds' stored cursors.
    Stored,
    /// Stored cursors, but further back than the replay cap allowed.
    Capped,
    /// No feed has checkpointed yet; start from the wall clock.
    Now,
}

impl fmt::Display for ResumeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Override => "override",
            Self::Stored => "stored",
            Self::Capped => "capped",
            Self::Now => "now",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub cursor: i64,
    pub source: ResumeSource,
}

/// Pick the cursor to subscribe from.
///
/// Every filter is initialized first so each feed has a cursor row. A
/// non-zero `start_cursor` is used verbatim. Otherwise the result is the
/// minimum stored cursor over feeds that have one, so no feed misses events;
/// feeds that never checkpointed are ignored. With no stored cursor at all the
/// stream starts at `now_us` and history is not backfilled.
///
/// `max_replay` bounds how far behind `now_us` a stored-state resume may
/// start. It never applies to the override.
pub fn resume_cursor(
    filters: &[Filter],
    start_cursor: i64,
    max_replay: Option<Duration>,
    now_us: i64,
) -> Result<ResumePoint> {
    for filter in filters {
        filter.initialize()?;
    }

    if start_cursor != 0 {
        return Ok(ResumePoint {
            cursor: start_cursor,
            source: ResumeSource::Override,
        });
    }

    let mut stored = Vec::with_capacity(filters.len());
    for filter in filters {
        let cursor = filter.latest_cursor()?;
        tracing::debug!(feed = %filter.name(), cursor = ?cursor, "stored cursor");
        stored.push(cursor);
    }

    let Some(cursor) = oldest_cursor(stored) else {
        return Ok(ResumePoint {
            cursor: now_us,
            source: ResumeSource::Now,
        });
    };

    if let Some(max_replay) = max_replay {
        let window = i64::try_from(max_replay.as_micros()).unwrap_or(i64::MAX);
        let floor = now_us.saturating_sub(window);
        if cursor < floor {
            tracing::warn!(
                stored = cursor,
                capped = floor,
                max_replay = ?max_replay,
                "stored cursor is older than the replay cap, skipping ahead"
            );
            return Ok(ResumePoint {
                cursor: floor,
                source: ResumeSource::Capped,
            });
        }
    }

    Ok(ResumePoint {
        cursor,
        source: ResumeSource::Stored,
    })
}

/// Minimum over the set cursors. Zero counts as unset.
fn oldest_cursor(stored: impl IntoIterator<Item = Option<i64>>) -> Option<i64> {
    stored.into_iter().flatten().filter(|&c| c > 0).min()
}
