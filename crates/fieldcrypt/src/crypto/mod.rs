//! Pluggable field ciphers.
//!
//! This module is free of any knowledge about records or fields; it turns one
//! string into another and back.
//!
//! # Ciphertext format
//!
//! ```text
//! base64(<iv or nonce> || <ciphertext>)
//! ```
//!
//! Standard, padded base64. The `<ENC>` marker that flags a stored value as
//! ciphertext is appended by the engine, not by the providers.

pub mod cbc;
pub mod cipher;
pub mod legacy;
pub mod registry;
pub mod siv;
mod wire;

pub use cbc::Aes256CbcCipher;
pub use cipher::{CipherError, CipherProvider, CipherProviderExt};
pub use legacy::LegacyFixedIvCipher;
pub use registry::{CipherFactory, CipherRegistry, CipherSelection, DEFAULT_CIPHER};
pub use siv::Aes256GcmSivCipher;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

use crate::secret::SensitiveValue;

/// Reject a key that is not exactly `expected` bytes long.
pub(crate) fn require_key_len(key: &SensitiveValue, expected: usize) -> Result<(), CipherError> {
    if key.len() != expected {
        return Err(CipherError::InvalidKeyLength {
            expected,
            actual: key.len(),
        });
    }
    Ok(())
}
