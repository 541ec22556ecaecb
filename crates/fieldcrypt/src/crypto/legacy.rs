//! Decrypt-only provider for values written under the historical fixed-IV scheme.
//!
//! That scheme chose one IV per provider instance and reused it for every
//! value, with no integrity envelope. IV reuse leaks equality of plaintexts
//! and prefixes, so this provider never encrypts: it exists so a DECRYPT
//! migration can read old data before it is re-encrypted under
//! [`super::Aes256CbcCipher`].

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};

use super::cbc::{decrypt_cbc, IV_LEN};
use super::{require_key_len, wire, CipherError, CipherProvider, KEY_LEN};
use crate::secret::SensitiveValue;

/// Registry alias.
pub const ALGORITHM: &str = "legacy-fixed-iv";

/// AES-256-CBC with an instance-wide IV and no integrity check.
#[derive(Debug, Clone)]
pub struct LegacyFixedIvCipher {
    key: SensitiveValue,
    iv: [u8; IV_LEN],
}

impl LegacyFixedIvCipher {
    /// Build a provider over a 32-byte key with an IV drawn once for its lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] for any other key length.
    pub fn new(key: SensitiveValue) -> Result<Self, CipherError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        Self::with_iv(key, iv)
    }

    /// Build a provider with an explicit fixed IV.
    pub fn with_iv(key: SensitiveValue, iv: [u8; IV_LEN]) -> Result<Self, CipherError> {
        require_key_len(&key, KEY_LEN)?;
        Ok(Self { key, iv })
    }

    /// Produce a value exactly as the historical write path did.
    #[cfg(test)]
    pub(crate) fn seal(&self, plaintext: &str) -> String {
        let body = super::cbc::encrypt_cbc(&self.key, &self.iv, plaintext.as_bytes());
        wire::encode(&self.iv, &body)
    }
}

impl CipherProvider for LegacyFixedIvCipher {
    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn supports_encryption(&self) -> bool {
        false
    }

    fn encrypt(&self, _plaintext: &str) -> Result<String, CipherError> {
        Err(CipherError::EncryptionUnsupported(ALGORITHM))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let (iv, body) = wire::decode(ciphertext, IV_LEN)?;
        let plaintext = decrypt_cbc(&self.key, &iv, &body)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed("plaintext is not UTF-8"))
    }
}
