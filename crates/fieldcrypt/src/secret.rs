//! [`SensitiveValue`]: scoped holder for secret key material.

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

/// Secret key bytes owned by a cipher provider.
///
/// The bytes are zeroed when the last copy is dropped and never leave the
/// holder except through [`SensitiveValue::expose`], which lends them to a
/// closure for the duration of one cryptographic operation. There is
/// deliberately no `Serialize` impl and `Debug` is redacted, so configuration
/// structs holding one can derive `Debug` safely.
#[derive(Clone)]
pub struct SensitiveValue(Zeroizing<Vec<u8>>);

impl SensitiveValue {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lend the raw bytes to `f`.
    ///
    /// Callers must not copy the slice out of the closure.
    pub fn expose<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0)
    }
}

impl From<String> for SensitiveValue {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl From<&str> for SensitiveValue {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<Vec<u8>> for SensitiveValue {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SensitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("SensitiveValue([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for SensitiveValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_in_debug() {
        let secret = SensitiveValue::from("hunter2-hunter2-hunter2-hunter2!");
        let printed = format!("{secret:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn expose_lends_the_bytes() {
        let secret = SensitiveValue::from("abc");
        assert_eq!(secret.len(), 3);
        assert!(secret.expose(|b| b == b"abc"));
    }

    #[test]
    fn deserialises_from_a_string() {
        let secret: SensitiveValue = serde_json::from_str(r#""0123456789""#).unwrap();
        assert_eq!(secret.len(), 10);
    }
}
