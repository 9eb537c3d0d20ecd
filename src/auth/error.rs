//! Authentication error types

use thiserror::Error;

use super::crypto::CryptoError;
use crate::protocol::{self, MessageType};

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Why a protocol run, credential or application message was rejected.
///
/// These never travel on the wire; peers only ever see the generic failure
/// records of each protocol.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Decode fault or broken channel
    #[error("wire error: {0}")]
    Wire(#[from] protocol::Error),

    /// Key derivation, decryption or integrity failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Identity has no entry in the secret store
    #[error("unknown identity")]
    UnknownIdentity,

    /// Ticket used at or after `creation-time + validity-period`
    #[error("ticket expired")]
    Expired,

    /// Nonce or challenge already present in the nonce cache
    #[error("replayed nonce")]
    ReplayDetected,

    /// Nonce cache holds its bound of live entries
    #[error("nonce cache full")]
    CacheFull,

    /// Declared identity does not match the expected partner
    #[error("identity mismatch")]
    IdentityMismatch {
        /// Identity this side expected
        expected: String,
        /// Identity the peer declared
        found: String,
    },

    /// Message type not valid in the current state
    #[error("unexpected message: {found}")]
    UnexpectedMessage {
        /// Received type
        found: MessageType,
    },

    /// Peer answered with a negative verdict
    #[error("rejected by peer")]
    Rejected,

    /// Challenge digest or echoed nonce did not verify
    #[error("response mismatch")]
    ResponseMismatch,

    /// State machine already reached COMPLETED or ERROR
    #[error("protocol run already finished")]
    Finished,

    /// Ticket-granting refused by the authority
    #[error("ticket denied: {reason}")]
    TicketDenied {
        /// Reason given by the authority
        reason: String,
    },
}

impl AuthError {
    /// Construct an identity mismatch error
    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::IdentityMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Whether the failure is a replay.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::ReplayDetected)
    }
}
