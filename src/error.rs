//! # Error Types
//!
//! Error handling for the PackStream codec and the message-dispatch layer
//! built on top of it.
//!
//! Every failure aborts the current `encode`/`decode` call and is returned to
//! the caller. Nothing is retried or corrected inside the codec, and the codec
//! never logs a failure on its own.
//!
//! ## Error Categories
//! - **Format Errors**: truncated input, unknown markers, non-text map keys,
//!   invalid UTF-8, misplaced end-of-stream markers
//! - **Limit Errors**: sizes beyond the wire format's range or the configured
//!   ceilings, nesting deeper than the configured depth
//! - **I/O Errors**: source or sink failures, propagated verbatim
//! - **Dispatch Errors**: unknown struct tags, missing handlers
//!
//! ## Example Usage
//! ```rust
//! use packstream::error::PackStreamError;
//!
//! // An Int32 marker with no payload behind it
//! match packstream::from_slice(&[0xCA]) {
//!     Err(PackStreamError::TruncatedInput { offset, needed }) => {
//!         assert_eq!(offset, 1);
//!         assert_eq!(needed, 4);
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use crate::core::marker::Kind;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Encoder streaming misuse
    pub const ERR_NO_OPEN_STREAM: &str = "No stream is open";
    pub const ERR_ENTRY_OUTSIDE_MAP_STREAM: &str = "Map entries can only be written into a map stream";
    pub const ERR_BARE_VALUE_IN_MAP_STREAM: &str =
        "Map streams take key/value entries, not bare values";
}

/// The error type for all codec and dispatch operations.
#[derive(Error, Debug)]
pub enum PackStreamError {
    #[error("Truncated input: needed {needed} byte(s) at offset {offset}")]
    TruncatedInput { offset: u64, needed: usize },

    #[error("Unknown marker 0x{marker:02X} at offset {offset}")]
    UnknownMarker { marker: u8, offset: u64 },

    #[error("{kind} size {size} exceeds limit {limit}")]
    SizeLimitExceeded { kind: Kind, size: u64, limit: u64 },

    #[error("Nesting depth {depth} exceeds limit {limit}")]
    DepthLimitExceeded { depth: usize, limit: usize },

    #[error("Map key at offset {offset} is {found}, expected Text")]
    NonTextMapKey { found: Kind, offset: u64 },

    #[error("Text at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: u64 },

    #[error("Unexpected end-of-stream marker at offset {offset}")]
    UnexpectedEndOfStream { offset: u64 },

    #[error("Trailing bytes: {remaining} byte(s) left after value ending at offset {offset}")]
    TrailingBytes { offset: u64, remaining: usize },

    #[error("Stream misuse: {0}")]
    StreamMismatch(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected message: expected a top-level Struct, found {0}")]
    UnexpectedMessage(Kind),

    #[error("Unknown message tag 0x{0:02X}")]
    UnknownMessageTag(u8),

    #[error("Unknown message name {0}")]
    UnknownMessageName(String),

    #[error("No handler registered for message {0}")]
    NoHandler(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl PackStreamError {
    /// Whether this error only means the source ran dry before a full value
    /// arrived. Buffering callers use this to wait for more bytes.
    pub fn is_truncation(&self) -> bool {
        matches!(self, PackStreamError::TruncatedInput { .. })
    }
}

/// Type alias for Results using PackStreamError
pub type Result<T> = std::result::Result<T, PackStreamError>;
