//! Mutual authentication of a principal and a service holding a ticket.
//!
//! ```text
//! client                                         service
//!   | --- Client Hello {ticket, n_c} --------------> |  open ticket, record n_c
//!   | <-- Handshake Response {service, E(n_c), n_s} - |
//!   | --- Handshake Response {id, E(n_s), n'} -----> |  verify, record n'
//! ```
//!
//! Each ciphertext is sealed under the session key with the sender's
//! identity as associated data.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use super::channel::MessageChannel;
use super::crypto::{self, MasterKey, SessionKey, ct_eq};
use super::error::{AuthError, Result};
use super::exchange::{self, Exchange, log_failure};
use super::nonce::NonceCache;
use super::ticket::Ticket;
use crate::protocol::{ClientHello, HandshakeResponse, Message};

const PROTOCOL: &str = "service";

/// Seal `peer_nonce` as proof of the session key, adding a fresh challenge.
fn respond(
    session_key: &SessionKey,
    sender: &str,
    peer_nonce: &[u8],
    cache: &NonceCache,
) -> Result<(HandshakeResponse, Vec<u8>)> {
    let sealed = crypto::seal(session_key, peer_nonce, sender.as_bytes())?;
    let nonce = cache.generate().ok_or(AuthError::CacheFull)?;
    let response = HandshakeResponse {
        service: sender.to_owned(),
        encrypted_response: sealed.ciphertext,
        nonce: nonce.clone(),
        iv: sealed.iv.to_vec(),
    };
    Ok((response, nonce))
}

/// Check a peer's proof: expected sender, our own nonce echoed under the
/// session key, and a fresh nonce. The peer nonce is recorded only once the
/// proof has verified.
fn verify(
    response: &HandshakeResponse,
    expected_sender: &str,
    our_nonce: &[u8],
    session_key: &SessionKey,
    cache: &NonceCache,
) -> Result<()> {
    if response.service != expected_sender {
        return Err(AuthError::mismatch(expected_sender, &response.service));
    }
    let echoed = crypto::open(
        session_key,
        &response.iv,
        &response.encrypted_response,
        response.service.as_bytes(),
    )?;
    if !ct_eq(&echoed, our_nonce) {
        return Err(AuthError::ResponseMismatch);
    }
    if !cache.insert(&response.nonce) {
        return Err(AuthError::ReplayDetected);
    }
    Ok(())
}

enum ClientStage {
    Start,
    AwaitServerProof { nonce: Vec<u8> },
    Completed,
    Error,
}

/// Principal side of the service handshake.
pub struct ServiceClient {
    principal: String,
    service: String,
    session_key: SessionKey,
    ticket: Ticket,
    cache: Arc<NonceCache>,
    stage: ClientStage,
}

impl ServiceClient {
    /// Prepare to present `ticket` to `service`.
    pub fn new(
        principal: impl Into<String>,
        service: impl Into<String>,
        session_key: SessionKey,
        ticket: Ticket,
        cache: Arc<NonceCache>,
    ) -> Self {
        Self {
            principal: principal.into(),
            service: service.into(),
            session_key,
            ticket,
            cache,
            stage: ClientStage::Start,
        }
    }

    /// Run the handshake; `true` once the service proved it holds the
    /// session key.
    pub fn run<C: MessageChannel + ?Sized>(&mut self, channel: &mut C) -> bool {
        exchange::run(self, channel)
    }

    /// Session key shared with the service.
    #[must_use]
    pub const fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// This principal.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The service being contacted.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    fn advance(&self, stage: ClientStage, incoming: Message) -> Result<(ClientStage, Option<Message>)> {
        match (stage, incoming) {
            (ClientStage::AwaitServerProof { nonce }, Message::HandshakeResponse(response)) => {
                verify(&response, &self.service, &nonce, &self.session_key, &self.cache)?;
                let (reply, _) = respond(&self.session_key, &self.principal, &response.nonce, &self.cache)?;
                Ok((ClientStage::Completed, Some(reply.into())))
            }
            (_, other) => Err(AuthError::UnexpectedMessage {
                found: other.message_type(),
            }),
        }
    }
}

impl Exchange for ServiceClient {
    fn start(&mut self) -> Option<Message> {
        if !matches!(self.stage, ClientStage::Start) {
            return None;
        }
        let Some(nonce) = self.cache.generate() else {
            log_failure(PROTOCOL, &AuthError::CacheFull);
            self.stage = ClientStage::Error;
            return None;
        };
        let hello = ClientHello {
            ticket: self.ticket.clone(),
            nonce: nonce.clone(),
        };
        self.stage = ClientStage::AwaitServerProof { nonce };
        Some(hello.into())
    }

    fn step(&mut self, incoming: Message) -> Option<Message> {
        if self.is_finished() {
            return None;
        }
        let stage = mem::replace(&mut self.stage, ClientStage::Error);
        match self.advance(stage, incoming) {
            Ok((next, reply)) => {
                self.stage = next;
                reply
            }
            Err(err) => {
                log_failure(PROTOCOL, &err);
                None
            }
        }
    }

    fn abort(&mut self, cause: &AuthError) {
        if !self.is_finished() {
            log_failure(PROTOCOL, cause);
            self.stage = ClientStage::Error;
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.stage, ClientStage::Completed | ClientStage::Error)
    }

    fn is_completed(&self) -> bool {
        matches!(self.stage, ClientStage::Completed)
    }
}

enum ServerStage {
    AwaitHello,
    AwaitClientProof {
        principal: String,
        session_key: SessionKey,
        nonce: Vec<u8>,
    },
    Completed {
        principal: String,
        session_key: SessionKey,
    },
    Error,
}

/// Service side of the handshake.
///
/// Failures are silent: the connection simply ends.
pub struct ServiceServer {
    service: String,
    master_key: MasterKey,
    cache: Arc<NonceCache>,
    stage: ServerStage,
}

impl ServiceServer {
    /// Accept tickets issued for `service` under `master_key`.
    pub fn new(service: impl Into<String>, master_key: MasterKey, cache: Arc<NonceCache>) -> Self {
        Self {
            service: service.into(),
            master_key,
            cache,
            stage: ServerStage::AwaitHello,
        }
    }

    /// Run the handshake; `true` once the principal proved it holds the
    /// session key.
    pub fn run<C: MessageChannel + ?Sized>(&mut self, channel: &mut C) -> bool {
        exchange::run(self, channel)
    }

    /// Session key of a completed handshake.
    #[must_use]
    pub const fn session_key(&self) -> Option<&SessionKey> {
        match &self.stage {
            ServerStage::Completed { session_key, .. } => Some(session_key),
            _ => None,
        }
    }

    /// Principal authenticated by a completed handshake.
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        match &self.stage {
            ServerStage::Completed { principal, .. } => Some(principal),
            _ => None,
        }
    }

    /// This service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    fn accept_hello(&self, hello: &ClientHello) -> Result<(ServerStage, Message)> {
        let ticket = &hello.ticket;
        // Reject foreign tickets before touching key material.
        if ticket.service() != self.service {
            return Err(AuthError::mismatch(&self.service, ticket.service()));
        }
        let session_key = ticket.session_key(&self.master_key)?;
        if !self.cache.insert(&hello.nonce) {
            return Err(AuthError::ReplayDetected);
        }

        let (reply, nonce) = respond(&session_key, &self.service, &hello.nonce, &self.cache)?;
        debug!(principal = %ticket.principal(), "ticket accepted");
        Ok((
            ServerStage::AwaitClientProof {
                principal: ticket.principal().to_owned(),
                session_key,
                nonce,
            },
            reply.into(),
        ))
    }

    fn advance(&self, stage: ServerStage, incoming: Message) -> Result<(ServerStage, Option<Message>)> {
        match (stage, incoming) {
            (ServerStage::AwaitHello, Message::ClientHello(hello)) => {
                let (next, reply) = self.accept_hello(&hello)?;
                Ok((next, Some(reply)))
            }
            (
                ServerStage::AwaitClientProof {
                    principal,
                    session_key,
                    nonce,
                },
                Message::HandshakeResponse(response),
            ) => {
                verify(&response, &principal, &nonce, &session_key, &self.cache)?;
                Ok((
                    ServerStage::Completed {
                        principal,
                        session_key,
                    },
                    None,
                ))
            }
            (_, other) => Err(AuthError::UnexpectedMessage {
                found: other.message_type(),
            }),
        }
    }
}

impl Exchange for ServiceServer {
    fn start(&mut self) -> Option<Message> {
        None
    }

    fn step(&mut self, incoming: Message) -> Option<Message> {
        if self.is_finished() {
            return None;
        }
        let stage = mem::replace(&mut self.stage, ServerStage::Error);
        match self.advance(stage, incoming) {
            Ok((next, reply)) => {
                self.stage = next;
                reply
            }
            Err(err) => {
                log_failure(PROTOCOL, &err);
                None
            }
        }
    }

    fn abort(&mut self, cause: &AuthError) {
        if !self.is_finished() {
            log_failure(PROTOCOL, cause);
            self.stage = ServerStage::Error;
        }
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.stage,
            ServerStage::Completed { .. } | ServerStage::Error
        )
    }

    fn is_completed(&self) -> bool {
        matches!(self.stage, ServerStage::Completed { .. })
    }
}
