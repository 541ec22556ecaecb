//! `fieldcrypt`: transparent, schema-declared at-rest field encryption.
//!
//! Record types implement [`Encryptable`] to declare which of their string
//! fields are stored encrypted. The [`EncryptionEngine`] encrypts those fields
//! before a record is written and decrypts them after it is read, using a
//! trailing [`marker::MARKER`] to tell ciphertext from plaintext so that every
//! transform is idempotent. The [`migrate::BatchMigrator`] drives the same
//! engine over an existing store in resumable batches.
//!
//! ```ignore
//! let cipher = CipherRegistry::with_builtins().build(&selection, &key)?;
//! let engine = EncryptionEngine::new(cipher, EngineConfig::default())?;
//! engine.process_entity(&mut user, Direction::Encrypt)?;
//! ```

pub mod config;
pub mod crypto;
pub mod engine;
pub mod hooks;
pub mod marker;
pub mod migrate;
pub mod schema;
pub mod secret;

pub use common::{Direction, EngineError};
pub use config::{DecryptTarget, EngineConfig};
pub use crypto::{CipherError, CipherProvider, CipherRegistry, CipherSelection};
pub use engine::{EncryptionEngine, EngineStats, Outcome};
pub use hooks::{EncryptionHooks, LifecycleEvent};
pub use migrate::{BatchMigrator, EntityRepository, MigrationObserver, MigrationTarget, NoopObserver};
pub use schema::{Accessor, Declaration, Encryptable, FieldSpec, FieldValue};
pub use secret::SensitiveValue;
