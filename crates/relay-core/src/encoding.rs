//! Base64 helpers for binary fields carried inside JSON envelopes.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::Result;

/// Encode raw bytes as standard base64 text.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 text (given as bytes) into raw bytes.
pub fn decode(text: &[u8]) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// Serde adapter that writes `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(de::Error::custom)
    }
}
