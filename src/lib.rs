//! KDC - ticket-based authentication for principals and services
//!
//! A key distribution center verifies principals by challenge-response and
//! issues AEAD-sealed tickets that let them run a mutually authenticated
//! handshake with a service, followed by sealed application messages.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use std::sync::Arc;
//! use kdc::auth::{LineChannel, NonceCache, client};
//!
//! let cache = Arc::new(NonceCache::default());
//!
//! // Obtain a ticket for `echo` from the authority
//! let mut kdc = LineChannel::from_tcp(TcpStream::connect("127.0.0.1:5000")?)?;
//! let credentials = client::request_ticket(&mut kdc, "alice", "s3cret", "echo", Arc::clone(&cache))
//!     .expect("ticket");
//!
//! // Present it to the service
//! let mut echo = LineChannel::from_tcp(TcpStream::connect("127.0.0.1:5001")?)?;
//! let reply = client::call_service(&mut echo, &credentials, "alice", "echo", cache, b"hello");
//! assert_eq!(reply.as_deref(), Some(&b"HELLO"[..]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Features
//!
//! - **Challenge-response** - SHA-256 digest over a fresh cache-issued challenge
//! - **Tickets** - AES-128-GCM under the service's scrypt-derived master key
//! - **Mutual handshake** - nonce echo under the session key, replay checked
//! - **Line-delimited JSON** - one typed record per line, base64 byte fields

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod auth;
pub mod config;
pub mod protocol;

pub use auth::{AuthError, Credentials, NonceCache, SecretStore, SessionKey, Ticket};
pub use protocol::{Error, MAX_RECORD_LEN, Message, MessageType, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default authority port
pub const DEFAULT_KDC_PORT: u16 = 5000;
