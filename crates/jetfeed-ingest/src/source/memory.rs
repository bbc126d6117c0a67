//! In-memory event source.

use std::collections::VecDeque;
use std::sync::Arc;

use jetfeed_core::{Error, Event, Result};

use super::{SourceStats, StreamSource, SubscribeOptions};

/// Serves a fixed list of events with the same subscribe semantics as a live
/// source. Byte counts are the record body sizes.
#[derive(Default)]
pub struct MemorySource {
    events: VecDeque<Event>,
    options: Option<SubscribeOptions>,
    stats: Arc<SourceStats>,
}

impl MemorySource {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
            options: None,
            stats: Arc::default(),
        }
    }
}

impl StreamSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn subscribe(&mut self, options: SubscribeOptions) -> Result<()> {
        self.options = Some(options);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<Event>> {
        let Some(options) = &self.options else {
            return Err(Error::StreamConnect("memory source not subscribed".into()));
        };
        while let Some(event) = self.events.pop_front() {
            self.stats
                .record(event.record_body.as_ref().map_or(0, Vec::len));
            if options.admits(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetfeed_core::{Operation, POST_COLLECTION};

    #[tokio::test]
    async fn test_skips_events_before_cursor() {
        let events = (1..=5).map(|t| {
            Event::commit(t * 10, "did:plc:a", Operation::Create, POST_COLLECTION, "k", None)
        });
        let mut source = MemorySource::new(events);
        source.subscribe(SubscribeOptions::new(30)).await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = source.next_event().await.unwrap() {
            seen.push(event.time_us);
        }
        assert_eq!(seen, vec![30, 40, 50]);
        assert_eq!(source.stats().events_read(), 5);
    }

    #[tokio::test]
    async fn test_requires_subscribe() {
        let mut source = MemorySource::new(Vec::new());
        assert!(matches!(
            source.next_event().await,
            Err(Error::StreamConnect(_))
        ));
    }
}
