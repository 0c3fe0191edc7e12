//! Error types for the framed stream.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by stream operations.
///
/// [`StreamError::Closed`] is the orderly end of a connection. Every other
/// variant is a protocol or transport failure after which the stream must
/// not be used again.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The peer sent the close sentinel, or a close was requested locally.
    #[error("stream closed")]
    Closed,

    /// The peer went away without sending the close sentinel.
    #[error("peer hung up without closing the stream")]
    HungUp,

    /// A header line did not follow the `#FR=<len>` grammar.
    #[error("malformed frame header: {0:?}")]
    MalformedHeader(String),

    /// A frame declared a payload larger than the configured limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared or attempted payload length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The bytes after the declared payload were not the frame trailer.
    #[error("missing frame trailer after {len} byte payload")]
    MissingTrailer {
        /// Declared payload length.
        len: usize,
    },

    /// Creating a FIFO failed.
    #[error("failed to create FIFO '{path}': {source}")]
    CreateFifo {
        /// FIFO path.
        path: PathBuf,
        /// Underlying errno.
        #[source]
        source: nix::Error,
    },

    /// Opening one end of a FIFO failed.
    #[error("failed to open '{path}': {source}")]
    Open {
        /// FIFO path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Polling the read end failed.
    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),

    /// Reading or writing failed.
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A frame payload could not be encoded or decoded.
    #[error("invalid frame data: {0}")]
    Codec(#[from] postcard::Error),
}

impl StreamError {
    /// Whether this is the orderly close rather than a failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamError::Closed)
    }

    pub(crate) fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StreamError::Open {
            path: path.into(),
            source,
        }
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn closed_is_distinct_from_failures() {
        assert!(StreamError::Closed.is_closed());
        assert!(!StreamError::HungUp.is_closed());
        assert!(!StreamError::MissingTrailer { len: 3 }.is_closed());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            StreamError::FrameTooLarge { len: 10, max: 4 }.to_string(),
            "frame of 10 bytes exceeds the 4 byte limit"
        );
        assert_eq!(
            StreamError::MalformedHeader("#XX".into()).to_string(),
            "malformed frame header: \"#XX\""
        );
    }

    #[test]
    fn open_error_exposes_source() {
        let err = StreamError::open(
            "/tmp/x/c2s",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/x/c2s"));
        assert!(err.source().is_some());
    }
}
