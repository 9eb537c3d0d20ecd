//! Wire-level error types

use thiserror::Error;

use super::MessageType;

/// Faults raised while moving records across a connection.
///
/// Every variant is fatal to the connection that produced it.
#[derive(Error, Debug)]
pub enum Error {
    /// Record is not valid JSON or lacks a required key
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Record is valid JSON but not an object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// Record has no string `type` field
    #[error("record has no type tag")]
    MissingType,

    /// Record carries a tag this crate does not know
    #[error("unknown message type: {tag:?}")]
    UnknownType {
        /// Tag found in the record
        tag: String,
    },

    /// Record is well formed but not what the receiver was waiting for
    #[error("unexpected message: {found}")]
    UnexpectedType {
        /// Tag found in the record
        found: MessageType,
    },

    /// Record exceeds the per-line limit
    #[error("record too large: more than {max} bytes")]
    RecordTooLarge {
        /// Maximum allowed
        max: usize,
    },

    /// Peer closed the connection
    #[error("channel closed by peer")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
