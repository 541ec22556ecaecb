//! AES-256-GCM-SIV field encryption.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant
//! and authenticated: any modified byte fails the tag check, unlike the
//! length envelope of [`super::Aes256CbcCipher`].
//!
//! **Do NOT substitute plain AES-256-GCM with a fixed nonce.** GCM nonce reuse
//! is catastrophic: it breaks both confidentiality and authentication.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};

use super::{require_key_len, wire, CipherError, CipherProvider, KEY_LEN};
use crate::secret::SensitiveValue;

/// Registry alias.
pub const ALGORITHM: &str = "aes-256-gcm-siv";

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Authenticated provider: random nonce per call, 16-byte tag.
#[derive(Debug, Clone)]
pub struct Aes256GcmSivCipher {
    key: SensitiveValue,
}

impl Aes256GcmSivCipher {
    /// Build a provider over a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] for any other key length.
    pub fn new(key: SensitiveValue) -> Result<Self, CipherError> {
        require_key_len(&key, KEY_LEN)?;
        Ok(Self { key })
    }

    fn build_cipher(&self) -> Result<Aes256GcmSiv, CipherError> {
        self.key.expose(|key| {
            Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            })
        })
    }
}

impl CipherProvider for Aes256GcmSivCipher {
    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = self.build_cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Malformed("aead encryption failed"))?;

        Ok(wire::encode(&nonce_bytes, &ciphertext))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let cipher = self.build_cipher()?;
        let (nonce_bytes, body) = wire::decode(ciphertext, NONCE_LEN)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, body.as_ref())
            .map_err(|_| CipherError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed("plaintext is not UTF-8"))
    }
}
