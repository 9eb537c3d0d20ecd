//! Wire format: typed records, their tags, and the line codec.

pub mod b64;
mod codec;
mod error;
mod message;
mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use message::{
    ChapChallenge, ChapInitial, ChapResponse, ChapResult, ClientHello, HandshakeResponse,
    Message, ServiceMessage, TicketError, TicketRequest, TicketResponse,
};
pub use types::MessageType;

/// Longest record accepted from a peer (64 KiB)
pub const MAX_RECORD_LEN: usize = 64 * 1024;
