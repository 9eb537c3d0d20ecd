//! Authentication core: credentials, protocol state machines, and the
//! connection handlers that run them.
//!
//! A principal first proves knowledge of its secret to the authority
//! ([`ChapClient`]/[`ChapServer`]), then obtains a [`Ticket`] and session key
//! for a service ([`TicketClient`]/[`TicketServer`]). Presenting the ticket
//! to the service runs a mutual handshake ([`ServiceClient`]/[`ServiceServer`])
//! after which both ends exchange sealed messages through a
//! [`MessageBuilder`].

mod app;
mod chap;
pub mod channel;
pub mod client;
pub mod crypto;
mod error;
pub mod exchange;
mod nonce;
mod secrets;
pub mod server;
mod service;
mod tgs;
mod ticket;

pub use app::MessageBuilder;
pub use chap::{ChapClient, ChapServer};
pub use channel::{LineChannel, MemoryChannel, MessageChannel};
pub use crypto::{CryptoError, MasterKey, RootKey, SessionKey};
pub use error::{AuthError, Result};
pub use exchange::Exchange;
pub use nonce::{DEFAULT_NONCE_LEN, DEFAULT_RETENTION, NonceCache};
pub use secrets::SecretStore;
pub use server::{ConnectionHandler, EchoHandler, KdcHandler, WorkerPool};
pub use service::{ServiceClient, ServiceServer};
pub use tgs::{Credentials, DENIED_REASON, TicketClient, TicketServer};
pub use ticket::{SessionKeyEnvelope, Ticket, now_millis};
