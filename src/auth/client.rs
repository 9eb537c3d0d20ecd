//! Principal-side flows composed from the individual protocols.

use std::sync::Arc;

use tracing::{debug, info};

use super::app::MessageBuilder;
use super::chap::ChapClient;
use super::channel::MessageChannel;
use super::crypto::derive_root_key;
use super::nonce::NonceCache;
use super::service::ServiceClient;
use super::tgs::{Credentials, TicketClient};
use crate::protocol::{Message, MessageType};

/// Authenticate to the authority and obtain a ticket for `service`, all on
/// one connection.
pub fn request_ticket<C: MessageChannel + ?Sized>(
    channel: &mut C,
    principal: &str,
    secret: &str,
    service: &str,
    cache: Arc<NonceCache>,
) -> Option<Credentials> {
    if !ChapClient::new(principal, secret, cache).run(channel) {
        info!("authentication failed");
        return None;
    }

    let root_key = match derive_root_key(principal, secret) {
        Ok(key) => key,
        Err(err) => {
            debug!(error = %err, "root key derivation failed");
            return None;
        }
    };
    let credentials = TicketClient::new(principal, service, root_key).run(channel);
    if credentials.is_none() {
        info!(service, "ticket request failed");
    }
    credentials
}

/// Run the service handshake, send `payload`, and return the decrypted
/// reply.
pub fn call_service<C: MessageChannel + ?Sized>(
    channel: &mut C,
    credentials: &Credentials,
    principal: &str,
    service: &str,
    cache: Arc<NonceCache>,
    payload: &[u8],
) -> Option<Vec<u8>> {
    let mut handshake = ServiceClient::new(
        principal,
        service,
        credentials.session_key.clone(),
        credentials.ticket.clone(),
        Arc::clone(&cache),
    );
    if !handshake.run(channel) {
        info!(service, "service handshake failed");
        return None;
    }

    let builder = MessageBuilder::new(service, principal, cache, handshake.session_key().clone());
    let request = match builder.build(payload) {
        Ok(message) => message,
        Err(err) => {
            debug!(error = %err, "could not seal request");
            return None;
        }
    };
    if let Err(err) = channel.send(&request.into()) {
        debug!(error = %err, "send failed");
        return None;
    }

    let reply = match channel.receive_expecting(&[MessageType::ServiceMessage]) {
        Ok(Message::ServiceMessage(reply)) => reply,
        Ok(_) => return None,
        Err(err) => {
            debug!(error = %err, "no reply from service");
            return None;
        }
    };
    match builder.open(&reply) {
        Ok(plaintext) => Some(plaintext.to_vec()),
        Err(err) => {
            debug!(error = %err, "reply discarded");
            None
        }
    }
}
