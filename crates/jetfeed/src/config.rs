//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it; a `.env` file is loaded before parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use axum::http::Uri;
use clap::{ArgAction, Args, Parser, ValueEnum};
use jetfeed_core::POST_COLLECTION;
use jetfeed_ingest::{CheckpointConfig, ConsumerConfig, FilterKind, JsonlConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Jetstream feed generator.
#[derive(Parser, Debug, Clone)]
#[command(name = "jetfeed")]
#[command(about = "Filters a Jetstream event stream into feeds and serves them")]
#[command(version)]
pub struct Config {
    /// RocksDB path for feed cursors and matches
    #[arg(long, env = "JETFEED_DB_PATH", default_value = "./data/jetfeed")]
    pub db_path: PathBuf,

    /// Enabled feeds (comma-separated filter names)
    #[arg(long, env = "FEED_NAMES", value_delimiter = ',', default_value = "composer-errors")]
    pub feed_names: Vec<String>,

    /// Log level or filter directive, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, env = "METRICS_PORT", default_value = "0")]
    pub metrics_port: u16,

    #[command(flatten)]
    pub consumer: ConsumerArgs,

    #[command(flatten)]
    pub feedgen: FeedgenArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ConsumerArgs {
    /// Run the stream consumer
    #[arg(id = "consumer_enabled", long = "consumer-enabled", env = "CONSUMER_ENABLED", action = ArgAction::Set, default_value_t = true)]
    pub enabled: bool,

    /// Jetstream JSONL input: file, directory, or - for stdin
    #[arg(long = "consumer-input", env = "CONSUMER_INPUT", default_value = "-")]
    pub input: PathBuf,

    /// Start from this cursor instead of the stored ones (0 = unset)
    #[arg(long = "start-cursor", env = "CONSUMER_START_CURSOR", default_value = "0")]
    pub start_cursor: i64,

    /// Never resume further back than this from stored cursors (e.g. 2h)
    #[arg(long = "max-replay", env = "CONSUMER_MAX_REPLAY", value_parser = humantime::parse_duration)]
    pub max_replay: Option<Duration>,

    /// How often the stream cursor is written to every feed
    #[arg(long = "checkpoint-interval", env = "CHECKPOINT_INTERVAL", default_value = "1s", value_parser = humantime::parse_duration)]
    pub checkpoint_interval: Duration,

    /// Collection decoded as posts
    #[arg(long = "post-collection", env = "POST_COLLECTION", default_value = POST_COLLECTION)]
    pub post_collection: String,
}

#[derive(Args, Debug, Clone)]
pub struct FeedgenArgs {
    /// Run the feed skeleton server
    #[arg(id = "feedgen_enabled", long = "feedgen-enabled", env = "FEEDGEN_ENABLED", action = ArgAction::Set, default_value_t = false)]
    pub enabled: bool,

    /// Interface the feed server binds to
    #[arg(long = "feedgen-host", env = "FEEDGEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the feed server listens on
    #[arg(long = "feedgen-port", env = "FEEDGEN_PORT", default_value = "9072")]
    pub port: u16,

    /// DID of the account publishing the feed-generator records
    #[arg(long = "feed-actor-did", env = "FEEDGEN_FEED_ACTOR_DID")]
    pub feed_actor_did: Option<String>,

    /// Public URL of this service; its hostname becomes the service DID
    #[arg(long = "service-endpoint", env = "FEEDGEN_SERVICE_ENDPOINT")]
    pub service_endpoint: Option<String>,

    /// How long in-flight requests may run after shutdown begins
    #[arg(long = "shutdown-grace", env = "SHUTDOWN_GRACE", default_value = "5s", value_parser = humantime::parse_duration)]
    pub shutdown_grace: Duration,
}

impl Config {
    /// Check cross-field rules clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.consumer.enabled && !self.feedgen.enabled {
            bail!("at least one of the consumer or the feed server must be enabled");
        }
        if self.db_path.as_os_str().is_empty() {
            bail!("database path is required");
        }
        if self.feed_names.iter().all(|name| name.trim().is_empty()) {
            bail!("at least one feed name is required");
        }
        for name in self.feeds() {
            name.parse::<FilterKind>()?;
        }

        if self.feedgen.enabled {
            if self.feedgen.port == 0 {
                bail!("feed server port is required");
            }
            if self
                .feedgen
                .feed_actor_did
                .as_deref()
                .is_none_or(str::is_empty)
            {
                bail!("feed actor DID is required when the feed server is enabled");
            }
            self.service_did()?;
        }
        Ok(())
    }

    /// Feed names with surrounding whitespace and empty entries removed.
    pub fn feeds(&self) -> Vec<String> {
        self.feed_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// `did:web:<host>` of the configured service endpoint.
    pub fn service_did(&self) -> Result<String> {
        let endpoint = self
            .feedgen
            .service_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .context("service endpoint is required when the feed server is enabled")?;
        let uri: Uri = endpoint
            .parse()
            .with_context(|| format!("invalid service endpoint '{endpoint}'"))?;
        match uri.host() {
            Some(host) if !host.is_empty() => Ok(format!("did:web:{host}")),
            _ => bail!("service endpoint '{endpoint}' has no hostname"),
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            feed_names: self.feeds(),
            start_cursor: self.consumer.start_cursor,
            max_replay: self.consumer.max_replay,
            checkpoint: CheckpointConfig {
                interval: self.consumer.checkpoint_interval,
                ..Default::default()
            },
            post_collection: self.consumer.post_collection.clone(),
        }
    }

    pub fn jsonl_config(&self) -> JsonlConfig {
        JsonlConfig {
            input: self.consumer.input.clone(),
        }
    }

    pub fn serve_config(&self) -> Result<jetfeed_serve::Config> {
        Ok(jetfeed_serve::Config {
            bind_addr: format!("{}:{}", self.feedgen.host, self.feedgen.port),
            feed_actor_did: self.feedgen.feed_actor_did.clone().unwrap_or_default(),
            service_did: self.service_did()?,
            feeds: self.feeds(),
            shutdown_grace: self.feedgen.shutdown_grace,
        })
    }

    /// Log the effective configuration.
    pub fn log(&self) {
        tracing::info!("Configuration:");
        tracing::info!("  Database: {}", self.db_path.display());
        tracing::info!("  Feeds: {}", self.feeds().join(", "));
        tracing::info!("  Log: {} ({:?})", self.log_level, self.log_format);
        tracing::info!("  Metrics port: {}", self.metrics_port);
        tracing::info!("  Consumer enabled: {}", self.consumer.enabled);
        if self.consumer.enabled {
            tracing::info!("    Input: {}", self.consumer.input.display());
            tracing::info!("    Start cursor: {}", self.consumer.start_cursor);
            tracing::info!("    Max replay: {:?}", self.consumer.max_replay);
            tracing::info!(
                "    Checkpoint interval: {}",
                humantime::format_duration(self.consumer.checkpoint_interval)
            );
            tracing::info!("    Post collection: {}", self.consumer.post_collection);
        }
        tracing::info!("  Feed server enabled: {}", self.feedgen.enabled);
        if self.feedgen.enabled {
            tracing::info!("    Bind: {}:{}", self.feedgen.host, self.feedgen.port);
            tracing::info!(
                "    Feed actor DID: {}",
                self.feedgen.feed_actor_did.as_deref().unwrap_or("")
            );
            tracing::info!(
                "    Service endpoint: {}",
                self.feedgen.service_endpoint.as_deref().unwrap_or("")
            );
            tracing::info!(
                "    Shutdown grace: {}",
                humantime::format_duration(self.feedgen.shutdown_grace)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("jetfeed").chain(args.iter().copied())).unwrap()
    }

    fn feedgen_args() -> Vec<&'static str> {
        vec![
            "--feedgen-enabled",
            "true",
            "--feed-actor-did",
            "did:plc:publisher",
            "--service-endpoint",
            "https://feeds.example.com",
        ]
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert!(config.consumer.enabled);
        assert!(!config.feedgen.enabled);
        assert_eq!(config.feeds(), vec!["composer-errors"]);
        assert_eq!(config.consumer.checkpoint_interval, Duration::from_secs(1));
        assert_eq!(config.feedgen.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.feedgen.port, 9072);
        assert_eq!(config.consumer.post_collection, POST_COLLECTION);
        assert_eq!(config.log_format, LogFormat::Text);
        config.validate().unwrap();
    }

    #[test]
    fn test_feed_names_and_durations() {
        let config = parse(&[
            "--feed-names",
            "english-text, composer-errors",
            "--max-replay",
            "2h",
            "--checkpoint-interval",
            "250ms",
            "--start-cursor",
            "1725911162329308",
        ]);
        assert_eq!(config.feeds(), vec!["english-text", "composer-errors"]);
        assert_eq!(config.consumer.max_replay, Some(Duration::from_secs(7200)));

        let consumer = config.consumer_config();
        assert_eq!(consumer.checkpoint.interval, Duration::from_millis(250));
        assert_eq!(consumer.start_cursor, 1725911162329308);
        assert_eq!(consumer.feed_names.len(), 2);
    }

    #[test]
    fn test_requires_a_component() {
        let config = parse(&["--consumer-enabled", "false"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn test_rejects_unknown_feed() {
        let config = parse(&["--feed-names", "composer-errors,cat-pictures"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_feed_list() {
        let config = parse(&["--feed-names", ""]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_feedgen_service_did() {
        let config = parse(&feedgen_args());
        config.validate().unwrap();
        assert_eq!(config.service_did().unwrap(), "did:web:feeds.example.com");

        let serve = config.serve_config().unwrap();
        assert_eq!(serve.bind_addr, "0.0.0.0:9072");
        assert_eq!(serve.feed_actor_did, "did:plc:publisher");
        assert_eq!(serve.feeds, vec!["composer-errors"]);
    }

    #[test]
    fn test_feedgen_requires_actor_and_endpoint() {
        let config = parse(&["--feedgen-enabled", "true"]);
        assert!(config.validate().is_err());

        let mut args = feedgen_args();
        args.truncate(4);
        assert!(parse(&args).validate().is_err());

        let mut args = feedgen_args();
        args[5] = "/just/a/path";
        let err = parse(&args).validate().unwrap_err();
        assert!(err.to_string().contains("no hostname"));

        let mut args = feedgen_args();
        args.extend(["--feedgen-port", "0"]);
        assert!(parse(&args).validate().is_err());
    }

    #[test]
    fn test_json_log_format() {
        let config = parse(&["--log-format", "json"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
