//! The process-wide stream position.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Live stream cursor shared between the event loop and the checkpoint loop.
///
/// The event loop is the only writer; it stores each event's `time_us` after
/// the event has been fully handled. Readers load the value without ever
/// blocking the writer. Because the stream delivers events in increasing time
/// order and there is a single writer, successive reads never go backwards.
#[derive(Debug, Clone, Default)]
pub struct SharedCursor(Arc<AtomicI64>);

impl SharedCursor {
    pub fn new(time_us: i64) -> Self {
        Self(Arc::new(AtomicI64::new(time_us)))
    }

    /// Current position in microseconds.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    /// Move the position to `time_us`.
    pub fn set(&self, time_us: i64) {
        self.0.store(time_us, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_position() {
        let cursor = SharedCursor::new(5);
        let reader = cursor.clone();
        cursor.set(10);
        assert_eq!(reader.get(), 10);
    }

    #[test]
    fn test_concurrent_reads_are_monotonic() {
        let cursor = SharedCursor::new(0);
        let reader = cursor.clone();

        let handle = std::thread::spawn(move || {
            let mut last = reader.get();
            for _ in 0..100_000 {
                let now = reader.get();
                assert!(now >= last, "cursor went backwards: {now} < {last}");
                last = now;
            }
        });

        for t in 1..=100_000 {
            cursor.set(t);
        }
        handle.join().unwrap();
    }
}
