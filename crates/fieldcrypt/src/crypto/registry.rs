//! Cipher registration: configuration names → [`CipherProvider`] instances.
//!
//! Each provider is reachable by a short alias (`aes-256-cbc`) and by a fully
//! qualified implementation identifier (`fieldcrypt::crypto::Aes256CbcCipher`).
//! Host applications add their own providers with [`CipherRegistry::register`].

use std::sync::Arc;

use common::EngineError;
use serde::Deserialize;

use super::{cbc, legacy, siv, Aes256CbcCipher, Aes256GcmSivCipher, CipherError, CipherProvider, LegacyFixedIvCipher};
use crate::secret::SensitiveValue;

/// Alias used when configuration names no cipher.
pub const DEFAULT_CIPHER: &str = cbc::ALGORITHM;

/// Constructor for a registered provider.
pub type CipherFactory = fn(SensitiveValue) -> Result<Arc<dyn CipherProvider>, CipherError>;

/// Which provider configuration asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CipherSelection {
    /// Short alias, e.g. `aes-256-cbc`.
    #[serde(default)]
    pub cipher: Option<String>,
    /// Fully qualified implementation identifier. Wins over `cipher`.
    #[serde(default)]
    pub cipher_impl: Option<String>,
}

impl CipherSelection {
    /// Select by alias.
    pub fn alias(alias: impl Into<String>) -> Self {
        Self {
            cipher: Some(alias.into()),
            cipher_impl: None,
        }
    }
}

struct Registration {
    alias: String,
    identifier: String,
    factory: CipherFactory,
}

/// Table of known cipher providers.
pub struct CipherRegistry {
    entries: Vec<Registration>,
}

impl CipherRegistry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry holding the built-in providers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.entries.push(Registration {
            alias: cbc::ALGORITHM.into(),
            identifier: "fieldcrypt::crypto::Aes256CbcCipher".into(),
            factory: build_cbc,
        });
        registry.entries.push(Registration {
            alias: siv::ALGORITHM.into(),
            identifier: "fieldcrypt::crypto::Aes256GcmSivCipher".into(),
            factory: build_siv,
        });
        registry.entries.push(Registration {
            alias: legacy::ALGORITHM.into(),
            identifier: "fieldcrypt::crypto::LegacyFixedIvCipher".into(),
            factory: build_legacy,
        });
        registry
    }

    /// Register a custom provider.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the alias or identifier is
    /// already taken.
    pub fn register(
        &mut self,
        alias: impl Into<String>,
        identifier: impl Into<String>,
        factory: CipherFactory,
    ) -> Result<(), EngineError> {
        let alias = alias.into();
        let identifier = identifier.into();
        if self
            .entries
            .iter()
            .any(|r| r.alias == alias || r.identifier == identifier)
        {
            return Err(EngineError::configuration(format!(
                "cipher `{alias}` ({identifier}) is already registered"
            )));
        }
        self.entries.push(Registration {
            alias,
            identifier,
            factory,
        });
        Ok(())
    }

    /// Registered aliases, in registration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|r| r.alias.as_str())
    }

    /// Build the provider registered under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] for an unknown alias or a key the
    /// provider rejects.
    pub fn by_alias(&self, alias: &str, key: &SensitiveValue) -> Result<Arc<dyn CipherProvider>, EngineError> {
        let entry = self.entries.iter().find(|r| r.alias == alias).ok_or_else(|| {
            EngineError::configuration(format!(
                "unknown cipher `{alias}`; supported: {}",
                self.aliases().collect::<Vec<_>>().join(", ")
            ))
        })?;
        instantiate(entry, key)
    }

    /// Build the provider registered under a fully qualified identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] for an unknown identifier or a
    /// key the provider rejects.
    pub fn by_identifier(
        &self,
        identifier: &str,
        key: &SensitiveValue,
    ) -> Result<Arc<dyn CipherProvider>, EngineError> {
        let entry = self
            .entries
            .iter()
            .find(|r| r.identifier == identifier)
            .ok_or_else(|| {
                EngineError::configuration(format!(
                    "`{identifier}` is not a registered cipher provider"
                ))
            })?;
        instantiate(entry, key)
    }

    /// Build the provider named by `selection`, falling back to [`DEFAULT_CIPHER`].
    pub fn build(
        &self,
        selection: &CipherSelection,
        key: &SensitiveValue,
    ) -> Result<Arc<dyn CipherProvider>, EngineError> {
        match (&selection.cipher_impl, &selection.cipher) {
            (Some(identifier), _) => self.by_identifier(identifier, key),
            (None, Some(alias)) => self.by_alias(alias, key),
            (None, None) => self.by_alias(DEFAULT_CIPHER, key),
        }
    }
}

impl Default for CipherRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn instantiate(entry: &Registration, key: &SensitiveValue) -> Result<Arc<dyn CipherProvider>, EngineError> {
    (entry.factory)(key.clone()).map_err(|e| {
        EngineError::configuration(format!("cannot build cipher `{}`: {e}", entry.alias))
    })
}

fn build_cbc(key: SensitiveValue) -> Result<Arc<dyn CipherProvider>, CipherError> {
    Ok(Arc::new(Aes256CbcCipher::new(key)?))
}

fn build_siv(key: SensitiveValue) -> Result<Arc<dyn CipherProvider>, CipherError> {
    Ok(Arc::new(Aes256GcmSivCipher::new(key)?))
}

fn build_legacy(key: SensitiveValue) -> Result<Arc<dyn CipherProvider>, CipherError> {
    Ok(Arc::new(LegacyFixedIvCipher::new(key)?))
}
