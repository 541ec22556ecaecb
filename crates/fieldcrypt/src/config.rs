//! Engine configuration.
//!
//! Every field has a default, so an empty document deserialises into the
//! recommended settings.

use common::EngineError;
use serde::{Deserialize, Serialize};

/// Where DECRYPT writes recovered plaintext.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptTarget {
    /// The field's shadow accessor when it has one, the canonical field
    /// otherwise. Leaves the persisted ciphertext untouched.
    #[default]
    PreferShadow,
    /// Always the canonical field.
    Canonical,
}

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Recurse into fields declared as embedded value objects.
    #[serde(default = "default_traverse_embedded")]
    pub traverse_embedded: bool,

    /// Deepest level of embedded objects visited below the root record.
    #[serde(default = "default_max_embedded_depth")]
    pub max_embedded_depth: usize,

    /// Write-back strategy for DECRYPT.
    #[serde(default)]
    pub decrypt_target: DecryptTarget,
}

fn default_traverse_embedded() -> bool {
    true
}
fn default_max_embedded_depth() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            traverse_embedded: default_traverse_embedded(),
            max_embedded_depth: default_max_embedded_depth(),
            decrypt_target: DecryptTarget::default(),
        }
    }
}

impl EngineConfig {
    /// Validate all fields, returning a descriptive error on the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if `max_embedded_depth` is zero.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_embedded_depth == 0 {
            return Err(EngineError::configuration("max_embedded_depth must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let cfg = EngineConfig::default();
        assert!(cfg.traverse_embedded);
        assert_eq!(cfg.max_embedded_depth, 4);
        assert_eq!(cfg.decrypt_target, DecryptTarget::PreferShadow);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn decrypt_target_is_snake_case() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"decrypt_target":"canonical"}"#).unwrap();
        assert_eq!(cfg.decrypt_target, DecryptTarget::Canonical);
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let cfg = EngineConfig {
            max_embedded_depth: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Configuration(_))));
    }
}
