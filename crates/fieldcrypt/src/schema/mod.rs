//! Declaration of encryptable fields, descriptor resolution and caching.
//!
//! # Responsibilities
//!
//! - Let every record type state, once and explicitly, which of its fields are
//!   encrypted and how to read and write them ([`Encryptable::declare`]).
//! - Merge ancestor declarations (ancestor first; a later declaration of the
//!   same field name replaces the earlier one in place).
//! - Bind each tagged field to an [`Accessor`] and cache the result per type
//!   name for the lifetime of the process ([`DescriptorRegistry`]).
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** Nothing here knows about ciphers or markers.
//! - A field is encryptable only if the final merged declaration tags it.

pub mod cache;
pub mod resolver;

pub use cache::DescriptorRegistry;
pub use resolver::{DescribedField, EmbeddedField, EncryptableField, EntityTypeDescriptor};

use std::marker::PhantomData;
use std::sync::Arc;

use crate::engine::EmbeddedEntity;

// ---------------------------------------------------------------------------
// Field values and accessors
// ---------------------------------------------------------------------------

/// A borrowed view of a field's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// The field is unset.
    Null,
    /// A string value.
    Text(&'a str),
    /// Any non-string value (numbers, blobs); never transformed.
    Other,
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(value: &'a str) -> Self {
        FieldValue::Text(value)
    }
}

impl<'a> From<&'a String> for FieldValue<'a> {
    fn from(value: &'a String) -> Self {
        FieldValue::Text(value)
    }
}

impl<'a> From<Option<&'a str>> for FieldValue<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Text)
    }
}

impl<'a> From<&'a Option<String>> for FieldValue<'a> {
    fn from(value: &'a Option<String>) -> Self {
        value.as_deref().into()
    }
}

/// Reads a field.
pub type Getter<T> = fn(&T) -> FieldValue<'_>;

/// Writes a field.
pub type Setter<T> = fn(&mut T, String);

/// Read/write access to one field of `T`.
///
/// Most records use plain function pointers (see [`FieldSpec`]); implement
/// this directly when the field location is only known at runtime, such as a
/// column index into a dynamically shaped row.
pub trait Accessor<T>: Send + Sync {
    /// Current value of the field.
    fn read<'a>(&self, record: &'a T) -> FieldValue<'a>;

    /// Replace the field's value.
    fn write(&self, record: &mut T, value: String);
}

pub(crate) struct FnAccessor<T> {
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Accessor<T> for FnAccessor<T> {
    fn read<'a>(&self, record: &'a T) -> FieldValue<'a> {
        (self.get)(record)
    }

    fn write(&self, record: &mut T, value: String) {
        (self.set)(record, value)
    }
}

/// Mutable access to an embedded value object of `T`.
pub trait EmbeddedAccess<T>: Send + Sync {
    /// The embedded object, if present.
    fn get_mut<'a>(&self, owner: &'a mut T) -> Option<&'a mut dyn EmbeddedEntity>;
}

struct FnEmbedded<T, E> {
    get: fn(&mut T) -> Option<&mut E>,
    _entity: PhantomData<fn() -> E>,
}

impl<T: 'static, E: Encryptable> EmbeddedAccess<T> for FnEmbedded<T, E> {
    fn get_mut<'a>(&self, owner: &'a mut T) -> Option<&'a mut dyn EmbeddedEntity> {
        (self.get)(owner).map(|e| e as &mut dyn EmbeddedEntity)
    }
}

// ---------------------------------------------------------------------------
// The capability trait
// ---------------------------------------------------------------------------

/// A record type whose fields the engine may encrypt.
///
/// ```ignore
/// impl Encryptable for User {
///     fn entity_type(&self) -> &str {
///         "User"
///     }
///
///     fn declare(&self, decl: &mut Declaration<Self>) {
///         decl.inherit("Timestamped", declare_timestamped)
///             .encrypted(FieldSpec::direct("secret", secret, set_secret))
///             .embedded("address", address);
///     }
/// }
/// ```
pub trait Encryptable: Sized + 'static {
    /// Stable type name; the descriptor cache key.
    fn entity_type(&self) -> &str;

    /// Declare this type's fields, ancestors first.
    ///
    /// Called once per type name per process; the result is cached.
    fn declare(&self, decl: &mut Declaration<Self>);
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// How a declared field is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Direct field access.
    Direct,
    /// Named getter/setter functions.
    Methods,
    /// A caller-supplied [`Accessor`].
    Custom,
}

/// Declaration of one field carrying the encryption tag.
pub struct FieldSpec<T> {
    pub(crate) name: String,
    pub(crate) kind: AccessKind,
    pub(crate) getter: Option<Getter<T>>,
    pub(crate) setter: Option<Setter<T>>,
    pub(crate) custom: Option<Arc<dyn Accessor<T>>>,
    pub(crate) shadow: Option<Arc<dyn Accessor<T>>>,
}

impl<T: 'static> FieldSpec<T> {
    /// A field that is read and written directly.
    pub fn direct(name: impl Into<String>, get: Getter<T>, set: Setter<T>) -> Self {
        Self {
            name: name.into(),
            kind: AccessKind::Direct,
            getter: Some(get),
            setter: Some(set),
            custom: None,
            shadow: None,
        }
    }

    /// A field reached through a getter/setter pair, supplied with
    /// [`FieldSpec::getter`] and [`FieldSpec::setter`].
    pub fn property(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AccessKind::Methods,
            getter: None,
            setter: None,
            custom: None,
            shadow: None,
        }
    }

    /// A field reached through a custom [`Accessor`].
    pub fn accessor(name: impl Into<String>, accessor: Arc<dyn Accessor<T>>) -> Self {
        Self {
            name: name.into(),
            kind: AccessKind::Custom,
            getter: None,
            setter: None,
            custom: Some(accessor),
            shadow: None,
        }
    }

    /// Set the getter.
    pub fn getter(mut self, get: Getter<T>) -> Self {
        self.getter = Some(get);
        self
    }

    /// Set the setter.
    pub fn setter(mut self, set: Setter<T>) -> Self {
        self.setter = Some(set);
        self
    }

    /// Where decrypted plaintext is kept when the canonical field must stay
    /// ciphertext.
    pub fn shadow(mut self, get: Getter<T>, set: Setter<T>) -> Self {
        self.shadow = Some(Arc::new(FnAccessor { get, set }));
        self
    }

    /// Custom shadow accessor.
    pub fn shadow_accessor(mut self, accessor: Arc<dyn Accessor<T>>) -> Self {
        self.shadow = Some(accessor);
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) enum Entry<T> {
    Encrypted(FieldSpec<T>),
    Embedded {
        name: String,
        access: Arc<dyn EmbeddedAccess<T>>,
    },
    Plain(String),
}

impl<T> Entry<T> {
    fn name(&self) -> &str {
        match self {
            Entry::Encrypted(spec) => &spec.name,
            Entry::Embedded { name, .. } => name,
            Entry::Plain(name) => name,
        }
    }
}

/// The field list a type builds in [`Encryptable::declare`].
pub struct Declaration<T> {
    pub(crate) entity_type: String,
    pub(crate) ancestors: Vec<String>,
    pub(crate) entries: Vec<Entry<T>>,
    pub(crate) is_abstract: bool,
}

impl<T: 'static> Declaration<T> {
    pub(crate) fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ancestors: Vec::new(),
            entries: Vec::new(),
            is_abstract: false,
        }
    }

    /// Pull in the fields of an ancestor type.
    ///
    /// Call ancestors before declaring the type's own fields so that the
    /// type's declarations take precedence.
    pub fn inherit(&mut self, ancestor: &str, declare: impl FnOnce(&mut Self)) -> &mut Self {
        self.ancestors.push(ancestor.to_owned());
        declare(self);
        self
    }

    /// Declare a field carrying the encryption tag.
    pub fn encrypted(&mut self, spec: FieldSpec<T>) -> &mut Self {
        self.upsert(Entry::Encrypted(spec));
        self
    }

    /// Declare a field without the tag. Only useful to override an inherited
    /// encrypted field of the same name.
    pub fn plain(&mut self, name: impl Into<String>) -> &mut Self {
        self.upsert(Entry::Plain(name.into()));
        self
    }

    /// Declare an embedded value object whose own encryptable fields are
    /// processed along with this record's.
    pub fn embedded<E: Encryptable>(
        &mut self,
        name: impl Into<String>,
        get: fn(&mut T) -> Option<&mut E>,
    ) -> &mut Self {
        self.upsert(Entry::Embedded {
            name: name.into(),
            access: Arc::new(FnEmbedded {
                get,
                _entity: PhantomData,
            }),
        });
        self
    }

    /// Mark the type as an abstract base used only for field inheritance; batch
    /// migrations never scan it on its own.
    pub fn mark_abstract(&mut self) -> &mut Self {
        self.is_abstract = true;
        self
    }

    /// Type name being declared.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn upsert(&mut self, entry: Entry<T>) {
        match self.entries.iter_mut().find(|e| e.name() == entry.name()) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }
}
