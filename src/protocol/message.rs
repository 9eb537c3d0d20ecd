//! Typed protocol records

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{MessageType, Result, b64};
use crate::auth::{SessionKeyEnvelope, Ticket};

/// `RFC1994 Initial`: the principal names itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapInitial {
    /// Principal identity
    pub id: String,
}

/// `RFC1994 Challenge`: random challenge issued by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapChallenge {
    /// Challenge bytes
    #[serde(with = "b64")]
    pub challenge: Vec<u8>,
}

/// `RFC1994 Response`: digest over challenge and secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapResponse {
    /// SHA-256 digest
    #[serde(with = "b64")]
    pub hash: Vec<u8>,
}

/// `RFC1994 Result`: authentication verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapResult {
    /// True if the principal is authenticated
    pub result: bool,
}

/// `Ticket Request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRequest {
    /// Requested service
    pub service: String,
    /// Requesting principal
    pub id: String,
}

/// `Ticket Response`: the ticket plus the principal's copy of the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TicketResponse {
    /// Session key sealed under the principal's root key
    pub session_key: SessionKeyEnvelope,
    /// Ticket sealed under the service's master key
    pub ticket: Ticket,
}

/// `Ticket Error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketError {
    /// Human readable refusal
    pub reason: String,
}

/// `Client Hello`: first message of the service handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    /// Ticket issued for the service
    pub ticket: Ticket,
    /// Client challenge
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
}

/// `Handshake Challenge Response`: proves possession of the session key by
/// returning the peer's nonce encrypted, and poses a new challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandshakeResponse {
    /// Identity of the sender; also the associated data of the ciphertext
    pub service: String,
    /// Peer nonce sealed under the session key
    #[serde(with = "b64")]
    pub encrypted_response: Vec<u8>,
    /// Fresh challenge for the peer
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    /// AEAD IV
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
}

/// `Service Message`: application payload sealed under the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceMessage {
    /// Service end of the conversation
    pub service: String,
    /// Principal end of the conversation
    pub id: String,
    /// Sealed payload
    #[serde(with = "b64")]
    pub encrypted_payload: Vec<u8>,
    /// Freshness token, bound into the associated data
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    /// AEAD IV
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
}

/// Any record this crate sends or receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// See [`ChapInitial`]
    #[serde(rename = "RFC1994 Initial")]
    ChapInitial(ChapInitial),
    /// See [`ChapChallenge`]
    #[serde(rename = "RFC1994 Challenge")]
    ChapChallenge(ChapChallenge),
    /// See [`ChapResponse`]
    #[serde(rename = "RFC1994 Response")]
    ChapResponse(ChapResponse),
    /// See [`ChapResult`]
    #[serde(rename = "RFC1994 Result")]
    ChapResult(ChapResult),
    /// See [`TicketRequest`]
    #[serde(rename = "Ticket Request")]
    TicketRequest(TicketRequest),
    /// See [`TicketResponse`]
    #[serde(rename = "Ticket Response")]
    TicketResponse(TicketResponse),
    /// See [`TicketError`]
    #[serde(rename = "Ticket Error")]
    TicketError(TicketError),
    /// See [`ClientHello`]
    #[serde(rename = "Client Hello")]
    ClientHello(ClientHello),
    /// See [`HandshakeResponse`]
    #[serde(rename = "Handshake Challenge Response")]
    HandshakeResponse(HandshakeResponse),
    /// See [`ServiceMessage`]
    #[serde(rename = "Service Message")]
    ServiceMessage(ServiceMessage),
}

macro_rules! impl_from_record {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(record: $variant) -> Self {
                    Self::$variant(record)
                }
            }
        )*
    };
}

impl_from_record!(
    ChapInitial,
    ChapChallenge,
    ChapResponse,
    ChapResult,
    TicketRequest,
    TicketResponse,
    TicketError,
    ClientHello,
    HandshakeResponse,
    ServiceMessage,
);

impl Message {
    /// Get message type
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ChapInitial(_) => MessageType::ChapInitial,
            Self::ChapChallenge(_) => MessageType::ChapChallenge,
            Self::ChapResponse(_) => MessageType::ChapResponse,
            Self::ChapResult(_) => MessageType::ChapResult,
            Self::TicketRequest(_) => MessageType::TicketRequest,
            Self::TicketResponse(_) => MessageType::TicketResponse,
            Self::TicketError(_) => MessageType::TicketError,
            Self::ClientHello(_) => MessageType::ClientHello,
            Self::HandshakeResponse(_) => MessageType::HandshakeResponse,
            Self::ServiceMessage(_) => MessageType::ServiceMessage,
        }
    }

    /// Encode message to one newline-terminated record
    pub fn encode(&self) -> Result<Bytes> {
        super::encode(self)
    }

    /// Decode message from one record
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        super::decode(bytes)
    }
}
