//! Ticket-granting: the authority issues a ticket and a session key for a
//! principal/service pair.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::channel::MessageChannel;
use super::crypto::{RootKey, SessionKey};
use super::error::{AuthError, Result};
use super::exchange::{self, Exchange, log_failure};
use super::secrets::SecretStore;
use super::ticket::{SessionKeyEnvelope, Ticket, now_millis};
use crate::protocol::{Message, TicketError, TicketRequest, TicketResponse};

const PROTOCOL: &str = "ticket";

/// Reason sent with every `Ticket Error`.
pub const DENIED_REASON: &str = "ticket request denied";

/// A ticket together with the principal's plaintext copy of its session key.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Opaque ticket to present to the service
    pub ticket: Ticket,
    /// Session key recovered from the envelope
    pub session_key: SessionKey,
}

enum ClientStage {
    Start,
    AwaitResponse,
    Completed(Credentials),
    Error,
}

/// Principal side of ticket-granting.
pub struct TicketClient {
    principal: String,
    service: String,
    root_key: RootKey,
    stage: ClientStage,
}

impl TicketClient {
    /// Request a ticket for `service`; the session-key envelope is opened
    /// with `root_key`.
    pub fn new(principal: impl Into<String>, service: impl Into<String>, root_key: RootKey) -> Self {
        Self {
            principal: principal.into(),
            service: service.into(),
            root_key,
            stage: ClientStage::Start,
        }
    }

    /// Run the exchange and return the credentials on success.
    pub fn run<C: MessageChannel + ?Sized>(mut self, channel: &mut C) -> Option<Credentials> {
        if !exchange::run(&mut self, channel) {
            return None;
        }
        match self.stage {
            ClientStage::Completed(credentials) => Some(credentials),
            _ => None,
        }
    }

    fn advance(&self, stage: ClientStage, incoming: Message) -> Result<ClientStage> {
        match (stage, incoming) {
            (
                ClientStage::AwaitResponse,
                Message::TicketResponse(TicketResponse {
                    session_key,
                    ticket,
                }),
            ) => {
                if ticket.principal() != self.principal {
                    return Err(AuthError::mismatch(&self.principal, ticket.principal()));
                }
                if ticket.service() != self.service {
                    return Err(AuthError::mismatch(&self.service, ticket.service()));
                }
                let session_key = session_key.decode(&self.root_key)?;
                Ok(ClientStage::Completed(Credentials {
                    ticket,
                    session_key,
                }))
            }
            (ClientStage::AwaitResponse, Message::TicketError(TicketError { reason })) => {
                Err(AuthError::TicketDenied { reason })
            }
            (_, other) => Err(AuthError::UnexpectedMessage {
                found: other.message_type(),
            }),
        }
    }
}

impl Exchange for TicketClient {
    fn start(&mut self) -> Option<Message> {
        if !matches!(self.stage, ClientStage::Start) {
            return None;
        }
        self.stage = ClientStage::AwaitResponse;
        Some(
            TicketRequest {
                service: self.service.clone(),
                id: self.principal.clone(),
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
            Ok(next) => self.stage = next,
            Err(err) => log_failure(PROTOCOL, &err),
        }
        None
    }

    fn abort(&mut self, cause: &AuthError) {
        if !self.is_finished() {
            log_failure(PROTOCOL, cause);
            self.stage = ClientStage::Error;
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.stage, ClientStage::Completed(_) | ClientStage::Error)
    }

    fn is_completed(&self) -> bool {
        matches!(self.stage, ClientStage::Completed(_))
    }
}

enum ServerStage {
    AwaitRequest,
    Completed(Ticket),
    Error,
}

/// Authority side of ticket-granting.
pub struct TicketServer {
    store: Arc<SecretStore>,
    lifetime_ms: u64,
    bound_to: Option<String>,
    stage: ServerStage,
}

impl TicketServer {
    /// Issue tickets valid for `lifetime_secs` seconds.
    #[must_use]
    pub fn new(store: Arc<SecretStore>, lifetime_secs: u64) -> Self {
        Self {
            store,
            lifetime_ms: lifetime_secs.saturating_mul(1000),
            bound_to: None,
            stage: ServerStage::AwaitRequest,
        }
    }

    /// Only serve requests naming `principal`, normally the identity just
    /// proven by challenge-response on the same connection.
    #[must_use]
    pub fn bound_to(mut self, principal: impl Into<String>) -> Self {
        self.bound_to = Some(principal.into());
        self
    }

    /// Ticket lifetime in milliseconds.
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }

    /// Serve one request; returns the issued ticket on success.
    pub fn run<C: MessageChannel + ?Sized>(mut self, channel: &mut C) -> Option<Ticket> {
        if !exchange::run(&mut self, channel) {
            return None;
        }
        match self.stage {
            ServerStage::Completed(ticket) => Some(ticket),
            _ => None,
        }
    }

    fn grant(&self, request: &TicketRequest) -> Result<TicketResponse> {
        if let Some(bound) = &self.bound_to {
            if *bound != request.id {
                return Err(AuthError::mismatch(bound, &request.id));
            }
        }
        let root_key = self
            .store
            .derive_key(&request.id)
            .ok_or(AuthError::UnknownIdentity)?;
        let master_key = self
            .store
            .master_key(&request.service)
            .ok_or(AuthError::UnknownIdentity)?;

        let session_key = SessionKey::generate();
        let ticket = Ticket::issue_at(
            &master_key,
            &session_key,
            &request.id,
            &request.service,
            now_millis(),
            self.lifetime_ms,
        )?;
        let envelope = SessionKeyEnvelope::seal(&root_key, &session_key)?;

        Ok(TicketResponse {
            session_key: envelope,
            ticket,
        })
    }
}

impl Exchange for TicketServer {
    fn start(&mut self) -> Option<Message> {
        None
    }

    fn step(&mut self, incoming: Message) -> Option<Message> {
        if self.is_finished() {
            return None;
        }
        self.stage = ServerStage::Error;

        let result = match incoming {
            Message::TicketRequest(request) => self.grant(&request),
            other => Err(AuthError::UnexpectedMessage {
                found: other.message_type(),
            }),
        };
        match result {
            Ok(response) => {
                info!(
                    principal = %response.ticket.principal(),
                    service = %response.ticket.service(),
                    "ticket issued"
                );
                self.stage = ServerStage::Completed(response.ticket.clone());
                Some(response.into())
            }
            Err(err) => {
                log_failure(PROTOCOL, &err);
                Some(
                    TicketError {
                        reason: DENIED_REASON.to_owned(),
                    }
                    .into(),
                )
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
        !matches!(self.stage, ServerStage::AwaitRequest)
    }

    fn is_completed(&self) -> bool {
        matches!(self.stage, ServerStage::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::channel::MemoryChannel;
    use crate::auth::crypto::derive_root_key;
    use std::thread;

    fn store() -> Arc<SecretStore> {
        let mut store = SecretStore::new();
        store.add("alice", "s3cret");
        store.add("echo", "echo-secret");
        Arc::new(store)
    }

    fn exchange(server: TicketServer, principal: &str, service: &str) -> (Option<Credentials>, Option<Ticket>) {
        let (mut client_end, mut server_end) = MemoryChannel::pair();
        let handle = thread::spawn(move || server.run(&mut server_end));

        let root = derive_root_key(principal, "s3cret").unwrap();
        let credentials = TicketClient::new(principal, service, root).run(&mut client_end);
        (credentials, handle.join().unwrap())
    }

    #[test]
    fn test_grant_ticket() {
        let (credentials, issued) = exchange(TicketServer::new(store(), 60), "alice", "echo");
        let credentials = credentials.expect("credentials");
        let issued = issued.expect("ticket");

        assert_eq!(credentials.ticket, issued);
        assert_eq!(issued.principal(), "alice");
        assert_eq!(issued.service(), "echo");
        assert_eq!(issued.validity_period(), 60_000);

        let master = store().master_key("echo").unwrap();
        assert_eq!(issued.session_key(&master).unwrap(), credentials.session_key);
    }

    #[test]
    fn test_unknown_service_denied() {
        let (credentials, issued) = exchange(TicketServer::new(store(), 60), "alice", "doesnotexist");
        assert!(credentials.is_none());
        assert!(issued.is_none());
    }

    #[test]
    fn test_denial_reason_is_generic() {
        let mut server = TicketServer::new(store(), 60);
        let reply = server.step(
            TicketRequest {
                service: "doesnotexist".into(),
                id: "alice".into(),
            }
            .into(),
        );
        assert_eq!(
            reply,
            Some(
                TicketError {
                    reason: DENIED_REASON.into()
                }
                .into()
            )
        );
        assert!(server.is_finished());
        assert!(!server.is_completed());
    }

    #[test]
    fn test_bound_server_rejects_other_principal() {
        let mut server = TicketServer::new(store(), 60).bound_to("bob");
        let reply = server.step(
            TicketRequest {
                service: "echo".into(),
                id: "alice".into(),
            }
            .into(),
        );
        assert!(matches!(reply, Some(Message::TicketError(_))));
    }

    #[test]
    fn test_lifetime_is_stored_in_millis() {
        let server = TicketServer::new(store(), 300);
        assert_eq!(server.lifetime(), Duration::from_secs(300));
    }

    #[test]
    fn test_client_rejects_wrong_root_key() {
        let (mut client_end, mut server_end) = MemoryChannel::pair();
        let handle = thread::spawn(move || TicketServer::new(store(), 60).run(&mut server_end));

        let wrong = derive_root_key("alice", "not-the-secret").unwrap();
        assert!(TicketClient::new("alice", "echo", wrong).run(&mut client_end).is_none());
        assert!(handle.join().unwrap().is_some());
    }
}
