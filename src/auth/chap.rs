//! Challenge-response authentication of a principal by the authority.
//!
//! ```text
//! client                          server
//!   | --- RFC1994 Initial {id} ----> |  look up secret
//!   | <-- RFC1994 Challenge -------- |  fresh nonce, even for unknown ids
//!   | --- RFC1994 Response {hash} -> |  SHA-256(challenge || secret)
//!   | <-- RFC1994 Result {bool} ---- |
//! ```

use std::mem;
use std::sync::Arc;

use zeroize::Zeroizing;

use super::channel::MessageChannel;
use super::crypto::{challenge_digest, ct_eq};
use super::error::{AuthError, Result};
use super::exchange::{self, Exchange, log_failure};
use super::nonce::NonceCache;
use super::secrets::SecretStore;
use crate::protocol::{ChapChallenge, ChapInitial, ChapResponse, ChapResult, Message};

const PROTOCOL: &str = "chap";

#[derive(Debug)]
enum ClientStage {
    Start,
    AwaitChallenge,
    AwaitResult,
    Completed,
    Error,
}

/// Principal side of challenge-response.
pub struct ChapClient {
    id: String,
    secret: Zeroizing<String>,
    cache: Arc<NonceCache>,
    stage: ClientStage,
}

impl ChapClient {
    /// Prepare to authenticate as `id`. Received challenges are checked
    /// against and recorded in `cache`.
    pub fn new(id: impl Into<String>, secret: &str, cache: Arc<NonceCache>) -> Self {
        Self {
            id: id.into(),
            secret: Zeroizing::new(secret.to_owned()),
            cache,
            stage: ClientStage::Start,
        }
    }

    /// Run the exchange; `true` if the authority accepted the response.
    pub fn run<C: MessageChannel + ?Sized>(mut self, channel: &mut C) -> bool {
        exchange::run(&mut self, channel)
    }

    fn advance(&self, stage: ClientStage, incoming: Message) -> Result<(ClientStage, Option<Message>)> {
        match (stage, incoming) {
            (ClientStage::AwaitChallenge, Message::ChapChallenge(ChapChallenge { challenge })) => {
                if !self.cache.insert(&challenge) {
                    return Err(AuthError::ReplayDetected);
                }
                let hash = challenge_digest(&challenge, &self.secret).to_vec();
                Ok((
                    ClientStage::AwaitResult,
                    Some(ChapResponse { hash }.into()),
                ))
            }
            (
                ClientStage::AwaitChallenge | ClientStage::AwaitResult,
                Message::ChapResult(ChapResult { result: false }),
            ) => Err(AuthError::Rejected),
            (ClientStage::AwaitResult, Message::ChapResult(ChapResult { result: true })) => {
                Ok((ClientStage::Completed, None))
            }
            (_, other) => Err(AuthError::UnexpectedMessage {
                found: other.message_type(),
            }),
        }
    }
}

impl Exchange for ChapClient {
    fn start(&mut self) -> Option<Message> {
        if !matches!(self.stage, ClientStage::Start) {
            return None;
        }
        self.stage = ClientStage::AwaitChallenge;
        Some(
            ChapInitial {
                id: self.id.clone(),
            }
            .into(),
        )
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
    AwaitInitial,
    AwaitResponse {
        id: String,
        secret: Option<Zeroizing<String>>,
        challenge: Vec<u8>,
    },
    Completed {
        id: String,
    },
    Error,
}

/// Authority side of challenge-response.
///
/// Every failure answers `RFC1994 Result {result: false}`, whatever the
/// cause. An unknown identity still receives a challenge, so it is told
/// apart from a wrong secret only in the local log.
pub struct ChapServer {
    store: Arc<SecretStore>,
    cache: Arc<NonceCache>,
    stage: ServerStage,
}

impl ChapServer {
    /// Verify principals registered in `store`; challenges come from `cache`.
    #[must_use]
    pub fn new(store: Arc<SecretStore>, cache: Arc<NonceCache>) -> Self {
        Self {
            store,
            cache,
            stage: ServerStage::AwaitInitial,
        }
    }

    /// Run the exchange; `true` if the principal proved knowledge of its
    /// secret. The identity is then available from
    /// [`ChapServer::authenticated_identity`].
    pub fn run<C: MessageChannel + ?Sized>(&mut self, channel: &mut C) -> bool {
        exchange::run(self, channel)
    }

    /// Identity proven by a completed run.
    #[must_use]
    pub fn authenticated_identity(&self) -> Option<&str> {
        match &self.stage {
            ServerStage::Completed { id } => Some(id),
            _ => None,
        }
    }

    fn advance(&self, stage: ServerStage, incoming: Message) -> Result<(ServerStage, Option<Message>)> {
        match (stage, incoming) {
            (ServerStage::AwaitInitial, Message::ChapInitial(ChapInitial { id })) => {
                // Unknown identities are challenged too and fail at the response.
                let secret = self
                    .store
                    .lookup(&id)
                    .map(|secret| Zeroizing::new(secret.to_owned()));
                let challenge = self.cache.generate().ok_or(AuthError::CacheFull)?;
                let reply = ChapChallenge {
                    challenge: challenge.clone(),
                };
                Ok((
                    ServerStage::AwaitResponse {
                        id,
                        secret,
                        challenge,
                    },
                    Some(reply.into()),
                ))
            }
            (
                ServerStage::AwaitResponse {
                    id,
                    secret,
                    challenge,
                },
                Message::ChapResponse(ChapResponse { hash }),
            ) => {
                let known = secret.is_some();
                let secret = secret.unwrap_or_default();
                let matches = ct_eq(&challenge_digest(&challenge, &secret), &hash);
                if !known {
                    return Err(AuthError::UnknownIdentity);
                }
                if !matches {
                    return Err(AuthError::ResponseMismatch);
                }
                Ok((
                    ServerStage::Completed { id },
                    Some(ChapResult { result: true }.into()),
                ))
            }
            (_, other) => Err(AuthError::UnexpectedMessage {
                found: other.message_type(),
            }),
        }
    }
}

impl Exchange for ChapServer {
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
                Some(ChapResult { result: false }.into())
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
