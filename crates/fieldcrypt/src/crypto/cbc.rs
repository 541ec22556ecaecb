//! AES-256-CBC with a random IV and a length-check envelope.
//!
//! The plaintext is wrapped as `{"data": <plaintext>, "length": <bytes>}`
//! before encryption and the length is verified after decryption. This catches
//! most corruption and wrong-key decryptions, but it is **not** an
//! authentication tag: a deliberate attacker who can flip ciphertext bits can
//! still forge values that pass the check. Use [`super::Aes256GcmSivCipher`]
//! where tamper resistance matters.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use serde::{Deserialize, Serialize};

use super::{require_key_len, wire, CipherError, CipherProvider, KEY_LEN};
use crate::secret::SensitiveValue;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Registry alias.
pub const ALGORITHM: &str = "aes-256-cbc";

/// Byte length of a CBC initialisation vector (one AES block).
pub const IV_LEN: usize = 16;

#[derive(Serialize)]
struct SealedEnvelope<'a> {
    data: &'a str,
    length: usize,
}

#[derive(Deserialize)]
struct OpenedEnvelope {
    data: String,
    length: usize,
}

/// The recommended provider: fresh IV per call plus a length integrity check.
#[derive(Debug, Clone)]
pub struct Aes256CbcCipher {
    key: SensitiveValue,
}

impl Aes256CbcCipher {
    /// Build a provider over a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] for any other key length.
    pub fn new(key: SensitiveValue) -> Result<Self, CipherError> {
        require_key_len(&key, KEY_LEN)?;
        Ok(Self { key })
    }
}

impl CipherProvider for Aes256CbcCipher {
    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let envelope = serde_json::to_vec(&SealedEnvelope {
            data: plaintext,
            length: plaintext.len(),
        })
        .map_err(|_| CipherError::Malformed("plaintext envelope could not be encoded"))?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let body = self.key.expose(|key| {
            Aes256CbcEnc::new_from_slices(key, &iv)
                .map(|enc| enc.encrypt_padded_vec_mut::<Pkcs7>(&envelope))
                .map_err(|_| CipherError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: key.len(),
                })
        })?;

        Ok(wire::encode(&iv, &body))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let (iv, body) = wire::decode(ciphertext, IV_LEN)?;
        let opened = decrypt_cbc(&self.key, &iv, &body)?;

        let envelope: OpenedEnvelope = serde_json::from_slice(&opened)
            .map_err(|_| CipherError::Malformed("decrypted envelope is not well formed"))?;
        if envelope.data.len() != envelope.length {
            return Err(CipherError::LengthMismatch {
                expected: envelope.length,
                actual: envelope.data.len(),
            });
        }
        Ok(envelope.data)
    }
}

/// Raw AES-256-CBC/PKCS#7 decryption, shared with the legacy provider.
pub(crate) fn decrypt_cbc(
    key: &SensitiveValue,
    iv: &[u8],
    body: &[u8],
) -> Result<Vec<u8>, CipherError> {
    key.expose(|key| {
        Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| CipherError::DecryptFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CipherError::DecryptFailed)
    })
}

/// Raw AES-256-CBC/PKCS#7 encryption under a caller-chosen IV.
#[cfg(test)]
pub(crate) fn encrypt_cbc(key: &SensitiveValue, iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    key.expose(|key| {
        Aes256CbcEnc::new_from_slices(key, iv)
            .expect("test key and iv have valid lengths")
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    })
}

/// Flip one byte of a sealed value's ciphertext body, leaving the IV intact.
#[cfg(test)]
pub(crate) fn tamper_body(sealed: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let mut raw = STANDARD.decode(sealed).expect("sealed value is base64");
    raw[IV_LEN] ^= 0xFF;
    STANDARD.encode(raw)
}
