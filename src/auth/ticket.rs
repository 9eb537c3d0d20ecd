//! Ticket and session-key envelope credentials.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::crypto::{self, MasterKey, RootKey, SessionKey, SymmetricKey};
use super::error::{AuthError, Result};
use crate::protocol::b64;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Time-bounded credential binding a principal to a service.
///
/// The session key inside is sealed under the service's master key with the
/// remaining fields as associated data, so none of them can be edited
/// without breaking decryption.
///
/// # Wire format
///
/// ```text
/// {"encrypted-key":<b64>, "creation-time":<ms>, "validity-period":<ms>,
///  "id":<principal>, "service":<service>, "iv":<b64>}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Ticket {
    #[serde(with = "b64")]
    encrypted_key: Vec<u8>,
    creation_time: u64,
    validity_period: u64,
    #[serde(rename = "id")]
    principal: String,
    service: String,
    #[serde(with = "b64")]
    iv: Vec<u8>,
}

impl Ticket {
    /// Issue a ticket valid from now for `validity`.
    pub fn issue(
        master_key: &MasterKey,
        session_key: &SessionKey,
        principal: &str,
        service: &str,
        validity: Duration,
    ) -> Result<Self> {
        let validity_ms = u64::try_from(validity.as_millis()).unwrap_or(u64::MAX);
        Self::issue_at(
            master_key,
            session_key,
            principal,
            service,
            now_millis(),
            validity_ms,
        )
    }

    /// Issue a ticket with an explicit creation time and validity, both in
    /// milliseconds.
    pub fn issue_at(
        master_key: &MasterKey,
        session_key: &SessionKey,
        principal: &str,
        service: &str,
        creation_time: u64,
        validity_period: u64,
    ) -> Result<Self> {
        let aad = associated_data(creation_time, validity_period, principal, service);
        let sealed = crypto::seal(master_key, session_key.as_bytes(), &aad)?;

        Ok(Self {
            encrypted_key: sealed.ciphertext,
            creation_time,
            validity_period,
            principal: principal.to_owned(),
            service: service.to_owned(),
            iv: sealed.iv.to_vec(),
        })
    }

    /// Recover the session key, checking validity against the current time.
    pub fn session_key(&self, master_key: &MasterKey) -> Result<SessionKey> {
        self.session_key_at(master_key, now_millis())
    }

    /// Recover the session key, checking validity against `now` (ms).
    ///
    /// # Errors
    ///
    /// - [`AuthError::Crypto`] if the key is wrong or any field was altered
    /// - [`AuthError::Expired`] if `now >= creation-time + validity-period`
    pub fn session_key_at(&self, master_key: &MasterKey, now: u64) -> Result<SessionKey> {
        let aad = associated_data(
            self.creation_time,
            self.validity_period,
            &self.principal,
            &self.service,
        );
        let plaintext = crypto::open(master_key, &self.iv, &self.encrypted_key, &aad)?;
        let key = SessionKey::from_bytes(&plaintext)?;

        if now >= self.expires_at() {
            return Err(AuthError::Expired);
        }
        Ok(key)
    }

    /// Principal the ticket was issued to.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Service the ticket is for.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Issuance time, ms since the epoch.
    #[must_use]
    pub const fn creation_time(&self) -> u64 {
        self.creation_time
    }

    /// Validity in ms.
    #[must_use]
    pub const fn validity_period(&self) -> u64 {
        self.validity_period
    }

    /// First instant (ms) at which the ticket is no longer valid.
    #[must_use]
    pub const fn expires_at(&self) -> u64 {
        self.creation_time.saturating_add(self.validity_period)
    }

    /// Whether the ticket has expired at `now` (ms). Says nothing about
    /// authenticity.
    #[must_use]
    pub const fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at()
    }
}

fn associated_data(creation_time: u64, validity_period: u64, principal: &str, service: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(24 + principal.len() + service.len());
    aad.extend_from_slice(&creation_time.to_be_bytes());
    aad.extend_from_slice(&validity_period.to_be_bytes());
    crypto::push_field(&mut aad, principal.as_bytes());
    crypto::push_field(&mut aad, service.as_bytes());
    aad
}

/// The principal's copy of a session key, sealed under its root key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionKeyEnvelope {
    #[serde(with = "b64")]
    encrypted_key: Vec<u8>,
    #[serde(with = "b64")]
    iv: Vec<u8>,
}

impl SessionKeyEnvelope {
    /// Seal `session_key` for the holder of `root_key`.
    pub fn seal(root_key: &RootKey, session_key: &SessionKey) -> Result<Self> {
        let sealed = crypto::seal(root_key, session_key.as_bytes(), &[])?;
        Ok(Self {
            encrypted_key: sealed.ciphertext,
            iv: sealed.iv.to_vec(),
        })
    }

    /// Recover the session key. No validity window applies.
    pub fn decode(&self, root_key: &RootKey) -> Result<SessionKey> {
        let plaintext = crypto::open(root_key, &self.iv, &self.encrypted_key, &[])?;
        Ok(SessionKey::from_bytes(&plaintext)?)
    }
}
