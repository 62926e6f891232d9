//! Error types for connection processing.
//!
//! [`HttpError`] is the top-level error surfaced by a connection. It wraps
//! the two layers below it: [`ParseError`] for anything wrong with the
//! bytes a peer sent, and [`StreamError`] for anything wrong with moving
//! bytes at all. Every error here is fatal to its connection and to
//! nothing else; the acceptor and the reactor survive all of them.

use std::io;
use thiserror::Error;

/// The top-level error type for connection processing.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer sent bytes that do not parse as a request.
    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    /// The underlying stream failed or went away.
    #[error("stream error: {source}")]
    Stream {
        #[from]
        source: StreamError,
    },

    /// The declared request body exceeds the per-stream buffer cap.
    #[error("request body of {length} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { length: u64, limit: usize },

    /// A value handed to `write_json` could not be serialized.
    #[error("json encode error: {source}")]
    JsonEncode {
        #[from]
        source: serde_json::Error,
    },
}

/// Errors raised while decoding request bytes.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The request line or header block is unusable.
    #[error("malformed request head: {reason}")]
    MalformedHead { reason: String },

    /// A request body did not match its declared content type.
    #[error("malformed request body: {reason}")]
    MalformedBody { reason: String },

    /// A percent-escape did not decode.
    #[error("malformed percent-encoding: {reason}")]
    MalformedEncoding { reason: String },
}

impl ParseError {
    pub fn malformed_head<S: ToString>(reason: S) -> Self {
        Self::MalformedHead { reason: reason.to_string() }
    }

    pub fn malformed_body<S: ToString>(reason: S) -> Self {
        Self::MalformedBody { reason: reason.to_string() }
    }

    pub fn malformed_encoding<S: ToString>(reason: S) -> Self {
        Self::MalformedEncoding { reason: reason.to_string() }
    }
}

/// Errors raised by the buffered stream layer.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The read buffer would exceed its cap without satisfying the
    /// pending read.
    #[error("read buffer exceeded the {limit} byte limit")]
    BufferOverflow { limit: usize },

    /// The peer closed the connection while a read was outstanding.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The stream was closed locally; no further reads or writes.
    #[error("stream is closed")]
    Closed,

    /// I/O error on the socket.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
