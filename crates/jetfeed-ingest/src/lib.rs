//! Jetfeed ingestion pipeline.
//!
//! This crate turns a time-ordered stream of Jetstream events into per-feed
//! matches in the [`MatchStore`](jetfeed_core::MatchStore), while keeping a
//! durable per-feed cursor so a restart resumes without losing events.
//!
//! # Modules
//!
//! - [`source`] - Stream source adapters (JSONL files/stdin, in-memory)
//! - [`filter`] - The content filters, one feed each
//! - [`dispatcher`] - Fans posts out to filters and advances the cursor
//! - [`resume`] - Picks the subscribe position at startup
//! - [`checkpoint`] - Persists the live cursor on a timer
//! - [`consumer`] - Wires the above into one task
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Stream Source  │  (Jetstream JSONL, in-memory)
//! └────────┬────────┘
//!          │ Event, increasing time_us
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │   Dispatcher    │─────▶│ Filters → Store │  idempotent match upserts
//! └────────┬────────┘      └─────────────────┘
//!          │ time_us
//!          ▼
//! ┌─────────────────┐
//! │  SharedCursor   │◀──── CheckpointLoop (every tick → feeds' cursor rows)
//! └─────────────────┘
//! ```
//!
//! Matches are at-least-once: after a restart the stream resumes from the
//! oldest feed cursor, and redelivered events upsert rows that already exist.

pub mod checkpoint;
pub mod consumer;
pub mod cursor;
pub mod dispatcher;
pub mod filter;
pub mod resume;
pub mod source;

pub use checkpoint::{CheckpointConfig, CheckpointLoop};
pub use consumer::{ConsumerConfig, ConsumerStats, run_consumer};
pub use cursor::SharedCursor;
pub use dispatcher::Dispatcher;
pub use filter::{Filter, FilterKind};
pub use resume::{ResumePoint, ResumeSource, resume_cursor};
pub use source::{
    JsonlConfig, JsonlSource, MemorySource, SourceStats, StreamSource, SubscribeOptions,
};
