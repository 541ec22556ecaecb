//! Adapter between a host persistence layer's lifecycle events and the engine.
//!
//! The host calls these synchronously with the record being written or the
//! record just loaded. Values are encrypted on the way to the store and
//! decrypted on the way back.

use common::{Direction, EngineError};

use crate::{engine::EncryptionEngine, schema::Encryptable};

/// Lifecycle events the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new record is about to be inserted.
    BeforeInsert,
    /// An existing record is about to be updated.
    BeforeUpdate,
    /// A record was just loaded from the store.
    AfterLoad,
    /// A record was just flushed; its in-memory copy holds ciphertext.
    AfterWrite,
}

impl LifecycleEvent {
    /// Direction the engine runs in for this event.
    pub fn direction(self) -> Direction {
        match self {
            LifecycleEvent::BeforeInsert | LifecycleEvent::BeforeUpdate => Direction::Encrypt,
            LifecycleEvent::AfterLoad | LifecycleEvent::AfterWrite => Direction::Decrypt,
        }
    }
}

/// Lifecycle hook handlers bound to one engine.
#[derive(Debug, Clone)]
pub struct EncryptionHooks {
    engine: EncryptionEngine,
}

impl EncryptionHooks {
    /// Bind hooks to `engine`.
    pub fn new(engine: EncryptionEngine) -> Self {
        Self { engine }
    }

    /// The bound engine.
    pub fn engine(&self) -> &EncryptionEngine {
        &self.engine
    }

    /// Encrypt before a new record is stored.
    pub fn before_insert<T: Encryptable>(&self, record: &mut T) -> Result<usize, EngineError> {
        self.dispatch(LifecycleEvent::BeforeInsert, record)
    }

    /// Encrypt before an existing record is stored.
    pub fn before_update<T: Encryptable>(&self, record: &mut T) -> Result<usize, EngineError> {
        self.dispatch(LifecycleEvent::BeforeUpdate, record)
    }

    /// Decrypt a freshly loaded record.
    pub fn after_load<T: Encryptable>(&self, record: &mut T) -> Result<usize, EngineError> {
        self.dispatch(LifecycleEvent::AfterLoad, record)
    }

    /// Restore plaintext in memory after a flush.
    pub fn after_write<T: Encryptable>(&self, record: &mut T) -> Result<usize, EngineError> {
        self.dispatch(LifecycleEvent::AfterWrite, record)
    }

    /// Run the engine for `event`.
    pub fn dispatch<T: Encryptable>(&self, event: LifecycleEvent, record: &mut T) -> Result<usize, EngineError> {
        self.engine.process_entity(record, event.direction())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::crypto::{Aes256GcmSivCipher, KEY_LEN};
    use crate::marker;
    use crate::schema::{Declaration, FieldSpec, FieldValue};
    use crate::secret::SensitiveValue;

    #[derive(Debug, Default)]
    struct Card {
        number: String,
    }

    fn number(c: &Card) -> FieldValue<'_> {
        (&c.number).into()
    }
    fn set_number(c: &mut Card, v: String) {
        c.number = v;
    }

    impl Encryptable for Card {
        fn entity_type(&self) -> &str {
            "Card"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("number", number, set_number));
        }
    }

    fn hooks() -> EncryptionHooks {
        let cipher = Arc::new(Aes256GcmSivCipher::new(SensitiveValue::new(vec![3u8; KEY_LEN])).unwrap());
        EncryptionHooks::new(EncryptionEngine::new(cipher, EngineConfig::default()).unwrap())
    }

    #[test]
    fn event_directions() {
        assert_eq!(LifecycleEvent::BeforeInsert.direction(), Direction::Encrypt);
        assert_eq!(LifecycleEvent::BeforeUpdate.direction(), Direction::Encrypt);
        assert_eq!(LifecycleEvent::AfterLoad.direction(), Direction::Decrypt);
        assert_eq!(LifecycleEvent::AfterWrite.direction(), Direction::Decrypt);
    }

    #[test]
    fn write_then_load_cycle() {
        let hooks = hooks();
        let mut card = Card {
            number: "4111111111111111".into(),
        };

        assert_eq!(hooks.before_insert(&mut card).unwrap(), 1);
        assert!(marker::is_marked(&card.number));
        assert_eq!(hooks.before_update(&mut card).unwrap(), 0);

        assert_eq!(hooks.after_write(&mut card).unwrap(), 1);
        assert_eq!(card.number, "4111111111111111");
        assert_eq!(hooks.after_load(&mut card).unwrap(), 0);
        assert_eq!(hooks.engine().stats().encrypted(), 1);
    }
}
