//! Base64 text encoding for byte-valued record fields.
//!
//! Use as `#[serde(with = "crate::protocol::b64")]` on `Vec<u8>` fields.

use base64::Engine;
use base64::engine::general_purpose::GeneralPurpose as Base64Engine;
use serde::{Deserialize, Deserializer, Serializer};

const B64ENGINE: Base64Engine = base64::engine::general_purpose::STANDARD;

/// Encode bytes as standard, padded base64.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    B64ENGINE.encode(bytes)
}

/// Decode standard, padded base64.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    B64ENGINE.decode(text)
}

/// Serde hook: write bytes as a base64 string.
pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode(bytes))
}

/// Serde hook: read a base64 string into bytes.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    decode(&text).map_err(serde::de::Error::custom)
}
