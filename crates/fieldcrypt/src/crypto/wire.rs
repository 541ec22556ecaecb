//! Encoding of `prefix || body` byte strings as stored text.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::CipherError;

/// Encode `prefix || body` as standard base64.
pub(crate) fn encode(prefix: &[u8], body: &[u8]) -> String {
    let mut raw = Vec::with_capacity(prefix.len() + body.len());
    raw.extend_from_slice(prefix);
    raw.extend_from_slice(body);
    STANDARD.encode(raw)
}

/// Decode stored text and split off a `prefix_len`-byte prefix.
///
/// # Errors
///
/// Returns [`CipherError::Malformed`] if the text is not base64 or is too
/// short to hold the prefix and at least one body byte.
pub(crate) fn decode(text: &str, prefix_len: usize) -> Result<(Vec<u8>, Vec<u8>), CipherError> {
    let mut raw = STANDARD
        .decode(text.trim())
        .map_err(|_| CipherError::Malformed("ciphertext is not valid base64"))?;
    if raw.len() <= prefix_len {
        return Err(CipherError::Malformed("ciphertext shorter than its iv"));
    }
    let body = raw.split_off(prefix_len);
    Ok((raw, body))
}
