//! Error types shared by the jetfeed pipeline and read path.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting, storing or serving feed matches.
///
/// Everything except [`Error::InvalidCursor`], [`Error::InvalidLimit`] and
/// [`Error::UnknownFeed`] is fatal for the consumer: it halts event processing
/// and the process is expected to restart and resume from the stored cursors.
#[derive(Error, Debug)]
pub enum Error {
    /// A record body from the stream could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Persisted store failure (RocksDB error or unreadable stored value).
    #[error("store error: {0}")]
    Store(String),

    /// Client-supplied pagination cursor is not a base-10 integer.
    #[error("invalid cursor '{cursor}': {reason}")]
    InvalidCursor {
        /// The cursor as received.
        cursor: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Page size was zero or negative.
    #[error("invalid limit {0}: must be a positive integer")]
    InvalidLimit(i64),

    /// Feed names are store partition keys and must be non-empty without NUL bytes.
    #[error("invalid feed name '{0}'")]
    InvalidFeedName(String),

    /// Feed is not served by this instance.
    #[error("unknown feed '{0}'")]
    UnknownFeed(String),

    /// The stream source could not be opened or stopped delivering.
    #[error("stream connect error: {0}")]
    StreamConnect(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Self::Store(err.into_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl Error {
    /// Whether this error was caused by the caller's request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCursor { .. }
                | Self::InvalidLimit(_)
                | Self::InvalidFeedName(_)
                | Self::UnknownFeed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_cursor_display() {
        let err = Error::InvalidCursor {
            cursor: "abc".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("invalid cursor"));
    }

    #[test]
    fn test_from_json_error_is_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().starts_with("decode error"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::InvalidLimit(0).is_client_error());
        assert!(Error::UnknownFeed("x".to_string()).is_client_error());
        assert!(!Error::Decode("bad".to_string()).is_client_error());
        assert!(!Error::StreamConnect("closed".to_string()).is_client_error());
    }
}
