//! The [`CipherProvider`] contract and its error type.

use thiserror::Error;

/// Errors produced by the cipher layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The key is the wrong length for the algorithm.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Length the algorithm requires.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The provider only exists to read historical data.
    #[error("{0} is decrypt-only and cannot encrypt new values")]
    EncryptionUnsupported(&'static str),

    /// The stored text does not have the expected shape.
    #[error("malformed ciphertext: {0}")]
    Malformed(&'static str),

    /// The block cipher or AEAD rejected the input (wrong key or tampered data).
    #[error("decryption failed")]
    DecryptFailed,

    /// The length recorded at encryption time does not match the decrypted data.
    #[error("integrity check failed: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length recorded inside the ciphertext.
        expected: usize,
        /// Length of the data actually recovered.
        actual: usize,
    },
}

impl CipherError {
    /// Returns `true` for errors caused by how the provider was set up rather
    /// than by the data being processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CipherError::InvalidKeyLength { .. } | CipherError::EncryptionUnsupported(_)
        )
    }
}

/// A string-to-string cipher over one secret key.
///
/// Implementations own their key exclusively, keep no per-call state and are
/// therefore shareable across threads and records. The returned ciphertext is
/// the unmarked wire body; marking is the engine's job.
#[cfg_attr(test, mockall::automock)]
pub trait CipherProvider: Send + Sync {
    /// Registry alias of the algorithm, used in logs and reports.
    fn algorithm(&self) -> &'static str;

    /// `false` for read-only providers kept for historical data.
    fn supports_encryption(&self) -> bool {
        true
    }

    /// Encrypt one plaintext value.
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Decrypt one unmarked ciphertext body.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// Nil-passthrough helpers available on every [`CipherProvider`].
pub trait CipherProviderExt: CipherProvider {
    /// Encrypt `plaintext`, passing `None` through untouched.
    fn encrypt_value(&self, plaintext: Option<&str>) -> Result<Option<String>, CipherError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// Decrypt `ciphertext`, passing `None` through untouched.
    fn decrypt_value(&self, ciphertext: Option<&str>) -> Result<Option<String>, CipherError> {
        ciphertext.map(|c| self.decrypt(c)).transpose()
    }
}

impl<T: CipherProvider + ?Sized> CipherProviderExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_passes_through_without_touching_the_cipher() {
        // No expectations: any call into the mock would panic.
        let mock = MockCipherProvider::new();
        assert_eq!(mock.encrypt_value(None).unwrap(), None);
        assert_eq!(mock.decrypt_value(None).unwrap(), None);
    }

    #[test]
    fn some_is_forwarded() {
        let mut mock = MockCipherProvider::new();
        mock.expect_encrypt()
            .withf(|p: &str| p == "hello")
            .times(1)
            .returning(|_| Ok("c2VhbGVk".into()));
        assert_eq!(
            mock.encrypt_value(Some("hello")).unwrap().as_deref(),
            Some("c2VhbGVk")
        );
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(CipherError::InvalidKeyLength { expected: 32, actual: 16 }.is_configuration());
        assert!(CipherError::EncryptionUnsupported("legacy-fixed-iv").is_configuration());
        assert!(!CipherError::DecryptFailed.is_configuration());
    }
}
