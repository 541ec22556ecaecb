//! Common error types shared across crates.

use thiserror::Error;

/// Top-level error type of the field-encryption engine.
///
/// Containment policy by variant:
/// - [`EngineError::Configuration`] → fatal, aborts the current operation.
/// - [`EngineError::Integrity`] → fatal for the offending record only; a batch
///   migration records it and moves on.
/// - [`EngineError::Store`] → fatal, aborts the batch job.
///
/// None of them is ever retried: a wrong key or corrupted ciphertext gives the
/// same answer the second time.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad key length, unknown cipher, or a field declared without a usable
    /// accessor pair.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A stored ciphertext failed to decrypt or failed its integrity check.
    #[error("integrity error on {entity_type}.{field}: {reason}")]
    Integrity {
        /// Record type owning the field.
        entity_type: String,
        /// Name of the field whose value could not be transformed.
        field: String,
        /// Cipher-layer description of the failure. Never contains data.
        reason: String,
    },

    /// The backing data store failed to read or commit a batch.
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Returns `false` only for errors that are contained to a single record.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Integrity { .. })
    }

    /// Short machine-readable code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "configuration",
            EngineError::Integrity { .. } => "integrity",
            EngineError::Store(_) => "store",
        }
    }

    /// Convenience constructor for [`EngineError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_integrity_is_contained() {
        assert!(EngineError::configuration("x").is_fatal());
        assert!(EngineError::Store("x".into()).is_fatal());
        let e = EngineError::Integrity {
            entity_type: "User".into(),
            field: "secret".into(),
            reason: "length mismatch".into(),
        };
        assert!(!e.is_fatal());
        assert_eq!(e.code(), "integrity");
    }

    #[test]
    fn display_locates_the_field() {
        let e = EngineError::Integrity {
            entity_type: "User".into(),
            field: "secret".into(),
            reason: "decryption failed".into(),
        };
        assert_eq!(
            e.to_string(),
            "integrity error on User.secret: decryption failed"
        );
    }
}
