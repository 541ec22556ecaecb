//! The per-record transform.
//!
//! [`EncryptionEngine::process_entity`] walks one record's descriptor, asks the
//! marker protocol how each value should be treated and calls the cipher only
//! for values that actually need it. Because already-marked values are skipped
//! on ENCRYPT and unmarked values on DECRYPT, repeated calls are idempotent.
//!
//! Processing runs in two phases. The first walks the record and its embedded
//! objects and computes every write; the second applies them. A failure
//! anywhere in the first phase leaves the whole record untouched.

use std::{
    any::{Any, TypeId},
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use common::{Direction, EngineError};
use tracing::debug;

use crate::{
    config::{DecryptTarget, EngineConfig},
    crypto::{CipherError, CipherProvider},
    marker::{self, Classification},
    schema::{
        Accessor, DescribedField, DescriptorRegistry, EmbeddedAccess, Encryptable, EntityTypeDescriptor, FieldValue,
    },
};

/// Counts of one `process_entity` call, embedded objects included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Non-empty string values seen in tagged fields.
    pub found: usize,
    /// Values actually encrypted or decrypted.
    pub processed: usize,
}

impl Outcome {
    fn absorb(&mut self, other: Outcome) {
        self.found += other.found;
        self.processed += other.processed;
    }
}

/// Running totals of values transformed by an engine and its clones.
#[derive(Debug, Default)]
pub struct EngineStats {
    encrypted: AtomicU64,
    decrypted: AtomicU64,
}

impl EngineStats {
    /// Values encrypted so far.
    pub fn encrypted(&self) -> u64 {
        self.encrypted.load(Ordering::Relaxed)
    }

    /// Values decrypted so far.
    pub fn decrypted(&self) -> u64 {
        self.decrypted.load(Ordering::Relaxed)
    }

    fn record(&self, direction: Direction, count: usize) {
        let counter = match direction {
            Direction::Encrypt => &self.encrypted,
            Direction::Decrypt => &self.decrypted,
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Traversal state of a single `process_entity` call.
#[derive(Debug, Default)]
pub struct Walk {
    visited: HashSet<(TypeId, usize)>,
    depth: usize,
}

/// Writes planned for an embedded object, held until the whole record has
/// been planned.
pub struct PlannedWrites(Box<dyn Any>);

/// An embedded value object the engine can recurse into.
///
/// Implemented for every [`Encryptable`] type; never implement it by hand.
pub trait EmbeddedEntity {
    /// Transform this object's own tagged fields as part of an outer walk,
    /// without writing anything yet.
    fn plan_embedded(
        &mut self,
        engine: &EncryptionEngine,
        direction: Direction,
        walk: &mut Walk,
    ) -> Result<(Outcome, PlannedWrites), EngineError>;

    /// Write back what [`EmbeddedEntity::plan_embedded`] produced for this object.
    fn apply_embedded(&mut self, planned: PlannedWrites, stats: &EngineStats, direction: Direction);
}

impl<E: Encryptable> EmbeddedEntity for E {
    fn plan_embedded(
        &mut self,
        engine: &EncryptionEngine,
        direction: Direction,
        walk: &mut Walk,
    ) -> Result<(Outcome, PlannedWrites), EngineError> {
        let (outcome, plan) = engine.plan(self, direction, walk)?;
        Ok((outcome, PlannedWrites(Box::new(plan))))
    }

    fn apply_embedded(&mut self, planned: PlannedWrites, stats: &EngineStats, direction: Direction) {
        if let Ok(plan) = planned.0.downcast::<Plan<E>>() {
            plan.apply(self, stats, direction);
        }
    }
}

/// Pending writes for one object and the objects embedded in it.
struct Plan<T> {
    writes: Vec<(Arc<dyn Accessor<T>>, String)>,
    embedded: Vec<(Arc<dyn EmbeddedAccess<T>>, PlannedWrites)>,
    processed: usize,
}

impl<T: 'static> Plan<T> {
    fn new() -> Self {
        Self {
            writes: Vec::new(),
            embedded: Vec::new(),
            processed: 0,
        }
    }

    fn apply(self, record: &mut T, stats: &EngineStats, direction: Direction) {
        for (access, planned) in self.embedded {
            if let Some(child) = access.get_mut(record) {
                child.apply_embedded(planned, stats, direction);
            }
        }
        for (accessor, value) in self.writes {
            accessor.write(record, value);
        }
        stats.record(direction, self.processed);
    }
}

/// Encrypts and decrypts the tagged fields of records.
///
/// Cloning is cheap: clones share the cipher, the descriptor registry and the
/// statistics.
#[derive(Clone)]
pub struct EncryptionEngine {
    cipher: Arc<dyn CipherProvider>,
    registry: DescriptorRegistry,
    config: EngineConfig,
    stats: Arc<EngineStats>,
}

impl EncryptionEngine {
    /// Create an engine over `cipher`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if `config` is invalid.
    pub fn new(cipher: Arc<dyn CipherProvider>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            cipher,
            registry: DescriptorRegistry::new(),
            config,
            stats: Arc::new(EngineStats::default()),
        })
    }

    /// A view of this engine running on a different cipher.
    ///
    /// The view shares the descriptor registry but keeps its own statistics;
    /// `self` is not modified.
    pub fn with_cipher(&self, cipher: Arc<dyn CipherProvider>) -> Self {
        Self {
            cipher,
            registry: self.registry.clone(),
            config: self.config.clone(),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// A view of this engine with a different DECRYPT write-back strategy.
    pub fn with_decrypt_target(&self, target: DecryptTarget) -> Self {
        let mut view = self.clone();
        view.config.decrypt_target = target;
        view
    }

    /// The active cipher.
    pub fn cipher(&self) -> &Arc<dyn CipherProvider> {
        &self.cipher
    }

    /// The engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The descriptor registry.
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    /// Running totals.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Resolved descriptor for the type of `sample`.
    pub fn describe<T: Encryptable>(&self, sample: &T) -> Result<Arc<EntityTypeDescriptor<T>>, EngineError> {
        self.registry.get(sample)
    }

    /// Transform `record` in `direction` and return how many values changed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Configuration`] if the type cannot be resolved or the
    ///   cipher cannot perform `direction`.
    /// - [`EngineError::Integrity`] if a stored ciphertext fails to decrypt.
    ///
    /// On error neither `record` nor any object embedded in it is changed.
    pub fn process_entity<T: Encryptable>(&self, record: &mut T, direction: Direction) -> Result<usize, EngineError> {
        self.process_entity_detailed(record, direction)
            .map(|outcome| outcome.processed)
    }

    /// Like [`EncryptionEngine::process_entity`], also reporting how many
    /// candidate values were seen.
    pub fn process_entity_detailed<T: Encryptable>(
        &self,
        record: &mut T,
        direction: Direction,
    ) -> Result<Outcome, EngineError> {
        if direction == Direction::Encrypt && !self.cipher.supports_encryption() {
            return Err(EngineError::configuration(format!(
                "cipher {} is decrypt-only",
                self.cipher.algorithm()
            )));
        }
        let (outcome, plan) = self.plan(record, direction, &mut Walk::default())?;
        plan.apply(record, &self.stats, direction);
        Ok(outcome)
    }

    /// Compute every write for `record` and its embedded objects. Nothing is
    /// written until the caller applies the returned plan.
    fn plan<T: Encryptable>(
        &self,
        record: &mut T,
        direction: Direction,
        walk: &mut Walk,
    ) -> Result<(Outcome, Plan<T>), EngineError> {
        let identity = (TypeId::of::<T>(), record as *const T as usize);
        if !walk.visited.insert(identity) {
            return Ok((Outcome::default(), Plan::new()));
        }

        let descriptor = self.registry.get(record)?;
        let entity_type = descriptor.entity_type.as_str();

        let mut own = Outcome::default();
        let mut plan = Plan::new();
        let mut embedded = Vec::new();

        for field in &descriptor.fields {
            let field = match field {
                DescribedField::Value(field) => field,
                DescribedField::Embedded(field) => {
                    embedded.push(field);
                    continue;
                }
            };

            let value = field.accessor.read(record);
            let (FieldValue::Text(text), class) = (value, marker::classify(&value)) else {
                continue;
            };

            match (direction, class) {
                (_, Classification::Passthrough) => continue,
                (Direction::Encrypt, Classification::Plaintext) => {
                    let body = self
                        .cipher
                        .encrypt(text)
                        .map_err(|e| cipher_failure(entity_type, &field.name, e))?;
                    plan.writes.push((Arc::clone(&field.accessor), marker::mark(&body)));
                    if let Some(shadow) = &field.shadow {
                        plan.writes.push((Arc::clone(shadow), text.to_owned()));
                    }
                    own.processed += 1;
                }
                (Direction::Decrypt, Classification::Ciphertext) => {
                    let plaintext = self
                        .cipher
                        .decrypt(marker::unmark(text))
                        .map_err(|e| cipher_failure(entity_type, &field.name, e))?;
                    let target = match (&field.shadow, self.config.decrypt_target) {
                        (Some(shadow), DecryptTarget::PreferShadow) => shadow,
                        _ => &field.accessor,
                    };
                    plan.writes.push((Arc::clone(target), plaintext));
                    own.processed += 1;
                }
                _ => debug!(entity_type, field = %field.name, %direction, "already in target form"),
            }
            own.found += 1;
        }

        let mut outcome = own;
        if self.config.traverse_embedded && walk.depth < self.config.max_embedded_depth {
            for field in embedded {
                let Some(child) = field.access.get_mut(record) else {
                    continue;
                };
                walk.depth += 1;
                let result = child.plan_embedded(self, direction, walk);
                walk.depth -= 1;
                let (child_outcome, planned) = result?;
                outcome.absorb(child_outcome);
                plan.embedded.push((Arc::clone(&field.access), planned));
            }
        } else if !embedded.is_empty() {
            debug!(entity_type, depth = walk.depth, "embedded traversal stopped");
        }

        plan.processed = own.processed;

        debug!(
            entity_type,
            %direction,
            found = own.found,
            processed = own.processed,
            "planned record fields"
        );
        Ok((outcome, plan))
    }
}

impl std::fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("cipher", &self.cipher.algorithm())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Locate a cipher failure on its field. Only the error kind is kept; values
/// never reach the message.
fn cipher_failure(entity_type: &str, field: &str, err: CipherError) -> EngineError {
    if err.is_configuration() {
        EngineError::configuration(format!("{entity_type}.{field}: {err}"))
    } else {
        EngineError::Integrity {
            entity_type: entity_type.to_owned(),
            field: field.to_owned(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{cbc::tamper_body, cipher::MockCipherProvider, Aes256CbcCipher, LegacyFixedIvCipher, KEY_LEN};
    use crate::schema::{Declaration, FieldSpec};
    use crate::secret::SensitiveValue;

    // -- fixtures -----------------------------------------------------------

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Address {
        street: String,
        city: String,
    }

    fn street(a: &Address) -> FieldValue<'_> {
        (&a.street).into()
    }
    fn set_street(a: &mut Address, v: String) {
        a.street = v;
    }

    impl Encryptable for Address {
        fn entity_type(&self) -> &str {
            "Address"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("street", street, set_street))
                .plain("city");
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct User {
        secret: String,
        nickname: Option<String>,
        age: i64,
        address: Address,
    }

    fn secret(u: &User) -> FieldValue<'_> {
        (&u.secret).into()
    }
    fn set_secret(u: &mut User, v: String) {
        u.secret = v;
    }
    fn nickname(u: &User) -> FieldValue<'_> {
        (&u.nickname).into()
    }
    fn set_nickname(u: &mut User, v: String) {
        u.nickname = Some(v);
    }
    fn age(_: &User) -> FieldValue<'_> {
        FieldValue::Other
    }
    fn set_age(_: &mut User, _: String) {}
    fn address(u: &mut User) -> Option<&mut Address> {
        Some(&mut u.address)
    }

    impl Encryptable for User {
        fn entity_type(&self) -> &str {
            "User"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("secret", secret, set_secret))
                .encrypted(FieldSpec::property("nickname").getter(nickname).setter(set_nickname))
                .encrypted(FieldSpec::direct("age", age, set_age))
                .embedded("address", address);
        }
    }

    fn key() -> SensitiveValue {
        SensitiveValue::new(vec![7u8; KEY_LEN])
    }

    fn engine() -> EncryptionEngine {
        let cipher = Arc::new(Aes256CbcCipher::new(key()).unwrap());
        EncryptionEngine::new(cipher, EngineConfig::default()).unwrap()
    }

    fn user(secret: &str) -> User {
        User {
            secret: secret.into(),
            ..User::default()
        }
    }

    // -- scenarios ----------------------------------------------------------

    #[test]
    fn hello_round_trip() {
        let engine = engine();
        let mut u = user("hello");

        assert_eq!(engine.process_entity(&mut u, Direction::Encrypt).unwrap(), 1);
        assert!(marker::is_marked(&u.secret));
        assert_ne!(u.secret, "hello");

        assert_eq!(engine.process_entity(&mut u, Direction::Decrypt).unwrap(), 1);
        assert_eq!(u.secret, "hello");
    }

    #[test]
    fn already_marked_value_is_untouched() {
        let engine = engine();
        let mut u = user("hello<ENC>");
        assert_eq!(engine.process_entity(&mut u, Direction::Encrypt).unwrap(), 0);
        assert_eq!(u.secret, "hello<ENC>");
    }

    #[test]
    fn encrypt_is_idempotent() {
        let engine = engine();
        let mut u = user("hello");
        u.nickname = Some("h".into());
        u.address.street = "1 Main St".into();
        engine.process_entity(&mut u, Direction::Encrypt).unwrap();
        let once = u.clone();

        let outcome = engine.process_entity_detailed(&mut u, Direction::Encrypt).unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.found, 3);
        assert_eq!(u, once);
    }

    #[test]
    fn decrypt_is_idempotent() {
        let engine = engine();
        let mut u = user("hello");
        assert_eq!(engine.process_entity(&mut u, Direction::Decrypt).unwrap(), 0);
        assert_eq!(u.secret, "hello");
    }

    #[test]
    fn passthrough_values_never_reach_the_cipher() {
        let mut mock = MockCipherProvider::new();
        mock.expect_supports_encryption().return_const(true);
        mock.expect_encrypt().never();
        mock.expect_decrypt().never();
        let engine = EncryptionEngine::new(Arc::new(mock), EngineConfig::default()).unwrap();

        let mut u = User::default();
        assert_eq!(engine.process_entity(&mut u, Direction::Encrypt).unwrap(), 0);
        assert_eq!(engine.process_entity(&mut u, Direction::Decrypt).unwrap(), 0);
        assert_eq!(u, User::default());
    }

    #[test]
    fn failing_field_leaves_record_unchanged() {
        let mut mock = MockCipherProvider::new();
        mock.expect_supports_encryption().return_const(true);
        mock.expect_encrypt()
            .withf(|p: &str| p == "hello")
            .returning(|_| Ok("body".into()));
        mock.expect_encrypt()
            .withf(|p: &str| p == "nick")
            .returning(|_| Err(CipherError::DecryptFailed));
        let engine = EncryptionEngine::new(Arc::new(mock), EngineConfig::default()).unwrap();

        let mut u = user("hello");
        u.nickname = Some("nick".into());
        let err = engine.process_entity(&mut u, Direction::Encrypt).unwrap_err();

        assert!(matches!(err, EngineError::Integrity { ref field, .. } if field == "nickname"));
        assert_eq!(u.secret, "hello");
        assert_eq!(engine.stats().encrypted(), 0);
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Leaf {
        v: String,
    }

    fn leaf_v(l: &Leaf) -> FieldValue<'_> {
        (&l.v).into()
    }
    fn set_leaf_v(l: &mut Leaf, v: String) {
        l.v = v;
    }

    impl Encryptable for Leaf {
        fn entity_type(&self) -> &str {
            "Leaf"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("v", leaf_v, set_leaf_v));
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pair {
        a: Leaf,
        b: Leaf,
    }

    fn pair_a(p: &mut Pair) -> Option<&mut Leaf> {
        Some(&mut p.a)
    }
    fn pair_b(p: &mut Pair) -> Option<&mut Leaf> {
        Some(&mut p.b)
    }

    impl Encryptable for Pair {
        fn entity_type(&self) -> &str {
            "Pair"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.embedded("a", pair_a).embedded("b", pair_b);
        }
    }

    #[test]
    fn failing_embedded_sibling_leaves_earlier_siblings_unchanged() {
        let mut mock = MockCipherProvider::new();
        mock.expect_supports_encryption().return_const(true);
        mock.expect_encrypt()
            .withf(|p: &str| p == "ok")
            .returning(|_| Ok("body".into()));
        mock.expect_encrypt()
            .withf(|p: &str| p == "bad")
            .returning(|_| Err(CipherError::DecryptFailed));
        let engine = EncryptionEngine::new(Arc::new(mock), EngineConfig::default()).unwrap();

        let mut pair = Pair {
            a: Leaf { v: "ok".into() },
            b: Leaf { v: "bad".into() },
        };
        let before = pair.clone();
        let err = engine.process_entity(&mut pair, Direction::Encrypt).unwrap_err();

        assert!(matches!(err, EngineError::Integrity { ref entity_type, ref field, .. }
            if entity_type == "Leaf" && field == "v"));
        assert_eq!(pair, before);
        assert_eq!(engine.stats().encrypted(), 0);
    }

    #[test]
    fn embedded_writes_land_once_the_whole_record_succeeds() {
        let mut mock = MockCipherProvider::new();
        mock.expect_supports_encryption().return_const(true);
        mock.expect_encrypt().returning(|p: &str| Ok(format!("sealed-{p}")));
        let engine = EncryptionEngine::new(Arc::new(mock), EngineConfig::default()).unwrap();

        let mut pair = Pair {
            a: Leaf { v: "x".into() },
            b: Leaf { v: "y".into() },
        };
        assert_eq!(engine.process_entity(&mut pair, Direction::Encrypt).unwrap(), 2);
        assert_eq!(pair.a.v, "sealed-x<ENC>");
        assert_eq!(pair.b.v, "sealed-y<ENC>");
        assert_eq!(engine.stats().encrypted(), 2);
    }

    #[test]
    fn corrupted_ciphertext_is_an_integrity_error() {
        let engine = engine();
        let mut u = user("hello");
        engine.process_entity(&mut u, Direction::Encrypt).unwrap();

        u.secret = marker::mark(&tamper_body(marker::unmark(&u.secret)));
        let stored = u.secret.clone();

        let err = engine.process_entity(&mut u, Direction::Decrypt).unwrap_err();
        assert!(matches!(err, EngineError::Integrity { ref entity_type, ref field, .. }
            if entity_type == "User" && field == "secret"));
        assert!(!err.is_fatal());
        assert_eq!(u.secret, stored);
    }

    #[test]
    fn decrypt_only_cipher_refuses_encrypt() {
        let legacy = LegacyFixedIvCipher::with_iv(key(), [1u8; 16]).unwrap();
        let sealed = format!("{}<ENC>", legacy.seal("hello"));
        let engine = EncryptionEngine::new(Arc::new(legacy), EngineConfig::default()).unwrap();

        let mut u = user("plain");
        let err = engine.process_entity(&mut u, Direction::Encrypt).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(u.secret, "plain");

        let mut old = user(&sealed);
        assert_eq!(engine.process_entity(&mut old, Direction::Decrypt).unwrap(), 1);
        assert_eq!(old.secret, "hello");
    }

    #[test]
    fn embedded_fields_are_processed() {
        let engine = engine();
        let mut u = user("hello");
        u.address.street = "1 Main St".into();
        u.address.city = "Springfield".into();

        let outcome = engine.process_entity_detailed(&mut u, Direction::Encrypt).unwrap();
        assert_eq!(outcome.processed, 2);
        assert!(marker::is_marked(&u.address.street));
        assert_eq!(u.address.city, "Springfield");

        engine.process_entity(&mut u, Direction::Decrypt).unwrap();
        assert_eq!(u.address.street, "1 Main St");
        assert_eq!(engine.stats().encrypted(), 2);
        assert_eq!(engine.stats().decrypted(), 2);
    }

    #[test]
    fn embedded_traversal_can_be_disabled() {
        let cipher = Arc::new(Aes256CbcCipher::new(key()).unwrap());
        let config = EngineConfig {
            traverse_embedded: false,
            ..EngineConfig::default()
        };
        let engine = EncryptionEngine::new(cipher, config).unwrap();
        let mut u = user("hello");
        u.address.street = "1 Main St".into();

        assert_eq!(engine.process_entity(&mut u, Direction::Encrypt).unwrap(), 1);
        assert_eq!(u.address.street, "1 Main St");
    }

    // -- shadow strategy ----------------------------------------------------

    #[derive(Debug, Default)]
    struct Vault {
        token: String,
        token_plain: Option<String>,
    }

    fn token(v: &Vault) -> FieldValue<'_> {
        (&v.token).into()
    }
    fn set_token(v: &mut Vault, s: String) {
        v.token = s;
    }
    fn token_plain(v: &Vault) -> FieldValue<'_> {
        (&v.token_plain).into()
    }
    fn set_token_plain(v: &mut Vault, s: String) {
        v.token_plain = Some(s);
    }

    impl Encryptable for Vault {
        fn entity_type(&self) -> &str {
            "Vault"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("token", token, set_token).shadow(token_plain, set_token_plain));
        }
    }

    #[test]
    fn decrypt_prefers_the_shadow() {
        let engine = engine();
        let mut v = Vault {
            token: "s3cr3t".into(),
            token_plain: None,
        };
        engine.process_entity(&mut v, Direction::Encrypt).unwrap();
        let stored = v.token.clone();
        assert_eq!(v.token_plain.as_deref(), Some("s3cr3t"));

        v.token_plain = None;
        assert_eq!(engine.process_entity(&mut v, Direction::Decrypt).unwrap(), 1);
        assert_eq!(v.token, stored);
        assert_eq!(v.token_plain.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn canonical_target_ignores_the_shadow() {
        let engine = engine().with_decrypt_target(DecryptTarget::Canonical);
        let mut v = Vault {
            token: "s3cr3t".into(),
            token_plain: None,
        };
        engine.process_entity(&mut v, Direction::Encrypt).unwrap();
        engine.process_entity(&mut v, Direction::Decrypt).unwrap();
        assert_eq!(v.token, "s3cr3t");
    }

    // -- bounded traversal --------------------------------------------------

    #[derive(Debug, Default)]
    struct Node {
        label: String,
        child: Option<Box<Node>>,
    }

    fn label(n: &Node) -> FieldValue<'_> {
        (&n.label).into()
    }
    fn set_label(n: &mut Node, v: String) {
        n.label = v;
    }
    fn child(n: &mut Node) -> Option<&mut Node> {
        n.child.as_deref_mut()
    }

    impl Encryptable for Node {
        fn entity_type(&self) -> &str {
            "Node"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("label", label, set_label))
                .embedded("child", child)
                .embedded("child_again", child);
        }
    }

    fn chain(len: usize) -> Node {
        (0..len).fold(Node::default(), |inner, i| Node {
            label: format!("n{i}"),
            child: (i > 0).then(|| Box::new(inner)),
        })
    }

    #[test]
    fn depth_limit_stops_recursion() {
        let cipher = Arc::new(Aes256CbcCipher::new(key()).unwrap());
        let config = EngineConfig {
            max_embedded_depth: 2,
            ..EngineConfig::default()
        };
        let engine = EncryptionEngine::new(cipher, config).unwrap();
        let mut root = chain(5);

        assert_eq!(engine.process_entity(&mut root, Direction::Encrypt).unwrap(), 3);
        let deepest = root.child.as_ref().and_then(|c| c.child.as_ref()).unwrap();
        assert!(marker::is_marked(&deepest.label));
        let beyond = deepest.child.as_ref().unwrap();
        assert!(!marker::is_marked(&beyond.label));
    }

    #[test]
    fn same_object_is_visited_once() {
        let engine = engine();
        let mut root = chain(2);
        // `child` and `child_again` reach the same object.
        assert_eq!(engine.process_entity(&mut root, Direction::Encrypt).unwrap(), 2);
        assert_eq!(engine.process_entity(&mut root, Direction::Decrypt).unwrap(), 2);
        assert_eq!(root.child.unwrap().label, "n0");
    }

    #[test]
    fn with_cipher_leaves_original_untouched() {
        let engine = engine();
        let other: Arc<dyn CipherProvider> = Arc::new(Aes256CbcCipher::new(SensitiveValue::new(vec![9u8; KEY_LEN])).unwrap());
        let view = engine.with_cipher(Arc::clone(&other));
        assert!(Arc::ptr_eq(view.cipher(), &other));
        assert!(!Arc::ptr_eq(engine.cipher(), &other));

        let mut u = user("hello");
        view.process_entity(&mut u, Direction::Encrypt).unwrap();
        assert_eq!(view.stats().encrypted(), 1);
        assert_eq!(engine.stats().encrypted(), 0);
        assert!(engine.process_entity(&mut u, Direction::Decrypt).is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cipher = Arc::new(Aes256CbcCipher::new(key()).unwrap());
        let config = EngineConfig {
            max_embedded_depth: 0,
            ..EngineConfig::default()
        };
        assert!(EncryptionEngine::new(cipher, config).is_err());
    }
}
