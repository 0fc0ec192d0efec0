//! Binary-safe repacking of SDEx ciphertext for transport through RSA string
//! operations.
//!
//! SDEx output is raw bytes; the RSA layer and the wire carry strings.
//! Coercing byte arrays through platform string types corrupts values outside
//! the printable range, so the repacking is explicit base64 in both
//! directions.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::ProtoError;

/// SDEx ciphertext bytes → transport string.
pub fn encode_content(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Transport string → SDEx ciphertext bytes.
pub fn decode_content(text: &str) -> Result<Vec<u8>, ProtoError> {
    Ok(BASE64.decode(text)?)
}
