//! Application messages sealed under a handshake's session key.

use std::sync::Arc;

use zeroize::Zeroizing;

use super::crypto::{self, SessionKey};
use super::error::{AuthError, Result};
use super::nonce::NonceCache;
use crate::protocol::ServiceMessage;

/// Builds and opens `Service Message` records for one conversation.
///
/// Associated data is `principal || service || nonce`, each field behind
/// its length, and every nonce is drawn from (and checked against) the
/// shared cache.
pub struct MessageBuilder {
    service: String,
    principal: String,
    cache: Arc<NonceCache>,
    session_key: SessionKey,
}

impl MessageBuilder {
    /// Conversation between `principal` and `service`.
    pub fn new(
        service: impl Into<String>,
        principal: impl Into<String>,
        cache: Arc<NonceCache>,
        session_key: SessionKey,
    ) -> Self {
        Self {
            service: service.into(),
            principal: principal.into(),
            cache,
            session_key,
        }
    }

    /// Seal `plaintext` under a fresh nonce.
    pub fn build(&self, plaintext: &[u8]) -> Result<ServiceMessage> {
        let nonce = self.cache.generate().ok_or(AuthError::CacheFull)?;
        let aad = associated_data(&self.principal, &self.service, &nonce);
        let sealed = crypto::seal(&self.session_key, plaintext, &aad)?;

        Ok(ServiceMessage {
            service: self.service.clone(),
            id: self.principal.clone(),
            encrypted_payload: sealed.ciphertext,
            nonce,
            iv: sealed.iv.to_vec(),
        })
    }

    /// Check and open a received message.
    ///
    /// The nonce is recorded first, then both identities are compared, and
    /// only then is the payload decrypted. Nothing is returned on failure.
    pub fn open(&self, message: &ServiceMessage) -> Result<Zeroizing<Vec<u8>>> {
        if !self.cache.insert(&message.nonce) {
            return Err(AuthError::ReplayDetected);
        }
        if message.service != self.service {
            return Err(AuthError::mismatch(&self.service, &message.service));
        }
        if message.id != self.principal {
            return Err(AuthError::mismatch(&self.principal, &message.id));
        }

        let aad = associated_data(&message.id, &message.service, &message.nonce);
        Ok(crypto::open(
            &self.session_key,
            &message.iv,
            &message.encrypted_payload,
            &aad,
        )?)
    }
}

fn associated_data(principal: &str, service: &str, nonce: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(12 + principal.len() + service.len() + nonce.len());
    crypto::push_field(&mut aad, principal.as_bytes());
    crypto::push_field(&mut aad, service.as_bytes());
    crypto::push_field(&mut aad, nonce);
    aad
}
