//! Key types and AEAD helpers (AES-128-GCM, scrypt, SHA-256).

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of every symmetric key in bytes (128 bits).
pub const KEY_LEN: usize = 16;
/// Length of AEAD IVs in bytes.
pub const IV_LEN: usize = 12;
/// Length of AEAD authentication tags in bytes.
pub const TAG_LEN: usize = 16;

// scrypt cost: N = 2^11, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 11;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Error type for cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material of unexpected length.
    #[error("invalid key length")]
    InvalidKeyLength,
    /// IV has invalid length.
    #[error("invalid IV length")]
    InvalidIvLength,
    /// Authentication failure during decryption.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// scrypt rejected its parameters.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Symmetric key usable with [`seal`] and [`open`].
pub trait SymmetricKey {
    /// Borrow as bytes.
    fn as_bytes(&self) -> &[u8; KEY_LEN];
}

fn copy_checked(bytes: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength)
}

macro_rules! key_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            /// Construct from a fixed-size array.
            #[must_use]
            pub const fn from_array(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            /// Construct from raw byte slice.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
                Ok(Self(copy_checked(bytes)?))
            }
        }

        impl SymmetricKey for $name {
            fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0[..].ct_eq(&other.0[..]).into()
            }
        }

        impl Eq for $name {}

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }
    };
}

key_type!(
    /// Principal's long-term key, derived from its identity and secret.
    RootKey
);

key_type!(
    /// Service's long-term key; only the service and the authority hold it.
    MasterKey
);

key_type!(
    /// Fresh key shared by one principal and one service for a ticket's lifetime.
    SessionKey
);

impl SessionKey {
    /// Draw a new random session key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self(bytes);
        bytes.zeroize();
        key
    }
}

/// Run scrypt over `secret`, salted by `identity`.
fn derive(identity: &str, secret: &str) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(secret.as_bytes(), identity.as_bytes(), &params, &mut out[..])
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(out)
}

/// Derive a principal's root key.
pub fn derive_root_key(identity: &str, secret: &str) -> Result<RootKey, CryptoError> {
    Ok(RootKey(*derive(identity, secret)?))
}

/// Derive a service's master key.
pub fn derive_master_key(service: &str, secret: &str) -> Result<MasterKey, CryptoError> {
    Ok(MasterKey(*derive(service, secret)?))
}

/// Output of [`seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Ciphertext followed by the GCM tag.
    pub ciphertext: Vec<u8>,
    /// Random IV used for this encryption.
    pub iv: [u8; IV_LEN],
}

fn cipher<K: SymmetricKey + ?Sized>(key: &K) -> Result<Aes128Gcm, CryptoError> {
    Aes128Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength)
}

/// Encrypt `plaintext` under a fresh random IV, authenticating `aad`.
pub fn seal<K: SymmetricKey + ?Sized>(
    key: &K,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Sealed, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher(key)?
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Ok(Sealed { ciphertext, iv })
}

/// Decrypt and verify; nothing is returned unless the tag checks out.
pub fn open<K: SymmetricKey + ?Sized>(
    key: &K,
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIvLength);
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::AuthenticationFailed);
    }

    cipher(key)?
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// `SHA-256(challenge ‖ secret)`, the challenge-response digest.
#[must_use]
pub fn challenge_digest(challenge: &[u8], secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(challenge);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Constant-time equality for digests and echoed nonces.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Append `field` to associated data behind its `u32` big-endian length, so
/// adjacent variable-length fields cannot shift into each other.
pub(crate) fn push_field(aad: &mut Vec<u8>, field: &[u8]) {
    let len = u32::try_from(field.len()).unwrap_or(u32::MAX);
    aad.extend_from_slice(&len.to_be_bytes());
    aad.extend_from_slice(field);
}
