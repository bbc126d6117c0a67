//! JSONL stream source.
//!
//! Reads Jetstream messages, one JSON object per line, from a file, from every
//! `*.jsonl`/`*.json`/`*.ndjson` file in a directory (sorted by name), or from
//! stdin when the input is `-`. Recorded Jetstream output can be replayed
//! through the pipeline this way, or a live stream piped in by an external
//! websocket client.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jetfeed_core::{Error, Event, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use super::{SourceStats, StreamSource, SubscribeOptions};

/// Input path meaning stdin.
pub const STDIN: &str = "-";

/// Configuration for the JSONL source.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Input file, directory, or `-` for stdin.
    pub input: PathBuf,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(STDIN),
        }
    }
}

type LineReader = Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>;

/// JSONL event source.
pub struct JsonlSource {
    config: JsonlConfig,
    options: Option<SubscribeOptions>,
    pending: VecDeque<PathBuf>,
    reader: Option<LineReader>,
    current: String,
    line_number: usize,
    stats: Arc<SourceStats>,
}

impl JsonlSource {
    pub fn new(config: JsonlConfig) -> Self {
        Self {
            config,
            options: None,
            pending: VecDeque::new(),
            reader: None,
            current: String::new(),
            line_number: 0,
            stats: Arc::default(),
        }
    }

    /// Resolve the input into the ordered list of files to read.
    async fn collect_inputs(input: &Path) -> Result<VecDeque<PathBuf>> {
        if input == Path::new(STDIN) {
            return Ok(VecDeque::from([input.to_path_buf()]));
        }

        let metadata = tokio::fs::metadata(input).await.map_err(|e| {
            Error::StreamConnect(format!("cannot open {}: {e}", input.display()))
        })?;
        if metadata.is_file() {
            return Ok(VecDeque::from([input.to_path_buf()]));
        }

        let mut dir = tokio::fs::read_dir(input).await.map_err(|e| {
            Error::StreamConnect(format!("cannot read {}: {e}", input.display()))
        })?;
        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_jsonl = path
                .extension()
                .is_some_and(|ext| ext == "jsonl" || ext == "json" || ext == "ndjson");
            if is_jsonl && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        // Sorted for deterministic replay order
        files.sort();
        Ok(files.into())
    }

    /// Open the next pending input. Returns false when none remain.
    async fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.pending.front() else {
            return Ok(false);
        };

        let inner: Box<dyn AsyncRead + Unpin + Send> = if path == Path::new(STDIN) {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                Error::StreamConnect(format!("cannot open {}: {e}", path.display()))
            })?;
            Box::new(file)
        };

        self.current = path.display().to_string();
        self.pending.pop_front();
        self.reader = Some(BufReader::new(inner).lines());
        self.line_number = 0;
        tracing::info!(input = %self.current, "reading events");
        Ok(true)
    }
}

impl StreamSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn subscribe(&mut self, options: SubscribeOptions) -> Result<()> {
        self.pending = Self::collect_inputs(&self.config.input).await?;
        self.reader = None;
        tracing::info!(
            input = %self.config.input.display(),
            files = self.pending.len(),
            cursor = options.cursor,
            "subscribed"
        );
        self.options = Some(options);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<Event>> {
        if self.options.is_none() {
            return Err(Error::StreamConnect("jsonl source not subscribed".into()));
        }

        loop {
            if self.reader.is_none() && !self.open_next().await? {
                return Ok(None);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!(input = %self.current, lines = self.line_number, "input finished");
                    self.reader = None;
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Err(Error::Decode(format!(
                        "{}:{}: {e}",
                        self.current,
                        self.line_number + 1
                    )));
                }
                Err(e) => {
                    return Err(Error::StreamConnect(format!(
                        "read {} after line {}: {e}",
                        self.current, self.line_number
                    )));
                }
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }
            self.stats.record(line.len());

            let event = Event::from_json(&line).map_err(|e| match e {
                Error::Decode(msg) => {
                    Error::Decode(format!("{}:{}: {msg}", self.current, self.line_number))
                }
                other => other,
            })?;

            if self.options.as_ref().is_some_and(|o| o.admits(&event)) {
                return Ok(Some(event));
            }
        }
    }

    fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetfeed_core::POST_COLLECTION;
    use std::io::Write;
    use tempfile::TempDir;

    fn line(time_us: i64, collection: &str, rkey: &str) -> String {
        format!(
            r#"{{"did":"did:plc:a","time_us":{time_us},"kind":"commit","commit":{{"operation":"create","collection":"{collection}","rkey":"{rkey}","record":{{"text":"hi"}}}}}}"#
        )
    }

    fn write_file(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for l in lines {
            writeln!(file, "{l}").unwrap();
        }
        path
    }

    async fn drain(source: &mut JsonlSource) -> Vec<i64> {
        let mut times = Vec::new();
        while let Some(event) = source.next_event().await.unwrap() {
            times.push(event.time_us);
        }
        times
    }

    #[tokio::test]
    async fn test_reads_file_from_cursor() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            tmp.path(),
            "events.jsonl",
            &[
                line(10, POST_COLLECTION, "a"),
                String::new(),
                line(20, "app.bsky.feed.like", "b"),
                line(30, POST_COLLECTION, "c"),
            ],
        );

        let mut source = JsonlSource::new(JsonlConfig { input: path });
        source
            .subscribe(SubscribeOptions::new(15).with_collection(POST_COLLECTION))
            .await
            .unwrap();

        assert_eq!(drain(&mut source).await, vec![30]);
        assert_eq!(source.stats().events_read(), 3);
    }

    #[tokio::test]
    async fn test_reads_directory_in_order() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "b.jsonl", &[line(30, POST_COLLECTION, "c")]);
        write_file(
            tmp.path(),
            "a.jsonl",
            &[line(10, POST_COLLECTION, "a"), line(20, POST_COLLECTION, "b")],
        );
        write_file(tmp.path(), "notes.txt", &["not an event".to_string()]);

        let mut source = JsonlSource::new(JsonlConfig {
            input: tmp.path().to_path_buf(),
        });
        source.subscribe(SubscribeOptions::new(0)).await.unwrap();
        assert_eq!(drain(&mut source).await, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_malformed_line_is_decode_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(
            tmp.path(),
            "events.jsonl",
            &[line(10, POST_COLLECTION, "a"), "{broken".to_string()],
        );

        let mut source = JsonlSource::new(JsonlConfig { input: path });
        source.subscribe(SubscribeOptions::new(0)).await.unwrap();
        assert!(source.next_event().await.unwrap().is_some());

        let err = source.next_event().await.unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("events.jsonl:2")));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_decode_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events.jsonl");
        let mut bytes = format!("{}\n", line(10, POST_COLLECTION, "a")).into_bytes();
        bytes.extend_from_slice(b"{\"did\":\"\xff\xfe\"}\n");
        std::fs::write(&path, bytes).unwrap();

        let mut source = JsonlSource::new(JsonlConfig { input: path });
        source.subscribe(SubscribeOptions::new(0)).await.unwrap();
        assert!(source.next_event().await.unwrap().is_some());

        let err = source.next_event().await.unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("events.jsonl:2")));
    }

    #[tokio::test]
    async fn test_missing_input_is_connect_error() {
        let tmp = TempDir::new().unwrap();
        let mut source = JsonlSource::new(JsonlConfig {
            input: tmp.path().join("missing.jsonl"),
        });
        assert!(matches!(
            source.subscribe(SubscribeOptions::new(0)).await,
            Err(Error::StreamConnect(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_subscribe() {
        let mut source = JsonlSource::new(JsonlConfig::default());
        assert!(matches!(
            source.next_event().await,
            Err(Error::StreamConnect(_))
        ));
    }
}
