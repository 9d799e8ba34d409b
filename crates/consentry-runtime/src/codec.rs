//! Opaque payload encoding for wrapped fragments (standard base64).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use consentry_core::{Error, Result};

pub fn encode(payload: &[u8]) -> String {
    STANDARD.encode(payload)
}

/// Decode a payload. Surrounding whitespace is tolerated.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Decode(e.to_string()))
}

/// Decode a payload that must be markup.
pub fn decode_html(encoded: &str) -> Result<String> {
    let bytes = decode(encoded)?;
    String::from_utf8(bytes).map_err(|e| Error::Decode(format!("payload is not UTF-8: {}", e)))
}
