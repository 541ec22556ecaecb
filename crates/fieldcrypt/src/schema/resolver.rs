//! Turns a type's [`Declaration`] into a resolved [`EntityTypeDescriptor`].
//!
//! Resolution merges ancestor declarations, drops fields that the final
//! declaration leaves untagged and binds every tagged field to an accessor.
//! Missing accessors are reported here, once per type, rather than on every
//! record.

use std::sync::Arc;

use common::EngineError;

use super::{AccessKind, Accessor, Declaration, EmbeddedAccess, Encryptable, Entry, FnAccessor};

/// Resolved metadata for one record type.
pub struct EntityTypeDescriptor<T> {
    /// Type name the descriptor is cached under.
    pub entity_type: String,
    /// Ancestor type names in declaration order.
    pub ancestors: Vec<String>,
    /// Tagged fields, ancestor fields first.
    pub fields: Vec<DescribedField<T>>,
    /// Abstract bases are skipped by batch migrations.
    pub is_abstract: bool,
}

impl<T> EntityTypeDescriptor<T> {
    /// Number of encrypted value fields.
    pub fn encrypted_fields(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f, DescribedField::Value(_)))
            .count()
    }

    /// Number of embedded value objects.
    pub fn embedded_fields(&self) -> usize {
        self.fields.len() - self.encrypted_fields()
    }

    /// Names of all tagged fields.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(DescribedField::name).collect()
    }

    /// `true` if the type has nothing to encrypt, directly or embedded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<T> std::fmt::Debug for EntityTypeDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTypeDescriptor")
            .field("entity_type", &self.entity_type)
            .field("ancestors", &self.ancestors)
            .field("fields", &self.field_names())
            .field("is_abstract", &self.is_abstract)
            .finish()
    }
}

/// One tagged entry of a descriptor.
pub enum DescribedField<T> {
    /// A string field that is encrypted in place.
    Value(EncryptableField<T>),
    /// An embedded object processed recursively.
    Embedded(EmbeddedField<T>),
}

impl<T> DescribedField<T> {
    /// Field name.
    pub fn name(&self) -> &str {
        match self {
            DescribedField::Value(f) => &f.name,
            DescribedField::Embedded(f) => &f.name,
        }
    }
}

/// A tagged string field bound to its accessors.
pub struct EncryptableField<T> {
    /// Field name.
    pub name: String,
    /// How the field is reached.
    pub kind: AccessKind,
    /// Canonical (persisted) value.
    pub accessor: Arc<dyn Accessor<T>>,
    /// Optional plaintext shadow.
    pub shadow: Option<Arc<dyn Accessor<T>>>,
}

/// A tagged embedded object.
pub struct EmbeddedField<T> {
    /// Field name.
    pub name: String,
    /// Reaches the embedded object from its owner.
    pub access: Arc<dyn EmbeddedAccess<T>>,
}

/// Build the descriptor for the type of `sample`.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] if a tagged field has no way to be
/// read or written.
pub fn resolve<T: Encryptable>(sample: &T) -> Result<EntityTypeDescriptor<T>, EngineError> {
    let mut decl = Declaration::new(sample.entity_type());
    sample.declare(&mut decl);

    let entity_type = decl.entity_type;
    let mut fields = Vec::with_capacity(decl.entries.len());

    for entry in decl.entries {
        match entry {
            Entry::Plain(_) => {}
            Entry::Embedded { name, access } => {
                fields.push(DescribedField::Embedded(EmbeddedField { name, access }));
            }
            Entry::Encrypted(spec) => {
                let accessor: Arc<dyn Accessor<T>> = match (spec.custom, spec.getter, spec.setter) {
                    (Some(custom), _, _) => custom,
                    (None, Some(get), Some(set)) => Arc::new(FnAccessor { get, set }),
                    (None, None, _) => {
                        return Err(EngineError::configuration(format!(
                            "field {entity_type}.{} is encrypted but has no getter",
                            spec.name
                        )))
                    }
                    (None, _, None) => {
                        return Err(EngineError::configuration(format!(
                            "field {entity_type}.{} is encrypted but has no setter",
                            spec.name
                        )))
                    }
                };
                fields.push(DescribedField::Value(EncryptableField {
                    name: spec.name,
                    kind: spec.kind,
                    accessor,
                    shadow: spec.shadow,
                }));
            }
        }
    }

    Ok(EntityTypeDescriptor {
        entity_type,
        ancestors: decl.ancestors,
        fields,
        is_abstract: decl.is_abstract,
    })
}
