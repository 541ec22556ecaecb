//! Process-wide cache of resolved descriptors, keyed by type name.
//!
//! Reads are lock-free loads of an [`ArcSwap`]ped map. The first use of a
//! type takes a populate lock, re-checks, resolves and publishes a new map, so
//! concurrent first uses still resolve each type exactly once.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use arc_swap::ArcSwap;
use common::EngineError;
use tracing::debug;

use super::{
    resolver::{resolve, EntityTypeDescriptor},
    Encryptable,
};

type Entries = HashMap<String, Arc<dyn Any + Send + Sync>>;

struct Inner {
    entries: ArcSwap<Entries>,
    populate: Mutex<()>,
}

/// Shared cache of [`EntityTypeDescriptor`]s.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct DescriptorRegistry {
    inner: Arc<Inner>,
}

impl DescriptorRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: ArcSwap::new(Arc::new(HashMap::new())),
                populate: Mutex::new(()),
            }),
        }
    }

    /// Number of types resolved so far.
    pub fn len(&self) -> usize {
        self.inner.entries.load().len()
    }

    /// Returns `true` if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.load().is_empty()
    }

    /// Descriptor for the type of `sample`, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if resolution fails, or if the
    /// type name is already cached for a different Rust type.
    pub fn get<T: Encryptable>(&self, sample: &T) -> Result<Arc<EntityTypeDescriptor<T>>, EngineError> {
        let name = sample.entity_type();
        if let Some(entry) = self.inner.entries.load().get(name) {
            return downcast(name, Arc::clone(entry));
        }

        let _guard = self
            .inner
            .populate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another thread may have finished while we waited.
        if let Some(entry) = self.inner.entries.load().get(name) {
            return downcast(name, Arc::clone(entry));
        }

        let descriptor = Arc::new(resolve(sample)?);
        debug!(
            entity_type = name,
            encrypted_fields = descriptor.encrypted_fields(),
            embedded_fields = descriptor.embedded_fields(),
            "resolved field descriptor"
        );

        let mut next: Entries = (**self.inner.entries.load()).clone();
        next.insert(name.to_owned(), Arc::clone(&descriptor) as Arc<dyn Any + Send + Sync>);
        self.inner.entries.store(Arc::new(next));

        Ok(descriptor)
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.entries.load();
        let mut names: Vec<&String> = entries.keys().collect();
        names.sort();
        f.debug_struct("DescriptorRegistry").field("types", &names).finish()
    }
}

fn downcast<T: Encryptable>(
    name: &str,
    entry: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<EntityTypeDescriptor<T>>, EngineError> {
    entry.downcast::<EntityTypeDescriptor<T>>().map_err(|_| {
        EngineError::configuration(format!(
            "type name {name} is declared by more than one record type"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Declaration, FieldSpec, FieldValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Profile {
        bio: String,
    }

    fn bio(p: &Profile) -> FieldValue<'_> {
        (&p.bio).into()
    }
    fn set_bio(p: &mut Profile, v: String) {
        p.bio = v;
    }

    impl Encryptable for Profile {
        fn entity_type(&self) -> &str {
            "Profile"
        }
        fn declare(&self, decl: &mut Declaration<Self>) {
            decl.encrypted(FieldSpec::direct("bio", bio, set_bio));
        }
    }

    static COUNTED_DECLARES: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Encryptable for Counted {
        fn entity_type(&self) -> &str {
            "Counted"
        }
        fn declare(&self, _decl: &mut Declaration<Self>) {
            COUNTED_DECLARES.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Impostor;

    impl Encryptable for Impostor {
        fn entity_type(&self) -> &str {
            "Profile"
        }
        fn declare(&self, _decl: &mut Declaration<Self>) {}
    }

    #[test]
    fn initially_empty() {
        let registry = DescriptorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn concurrent_first_use_resolves_once() {
        let registry = DescriptorRegistry::new();

        std::thread::scope(|s| {
            for _ in 0..8 {
                let registry = registry.clone();
                s.spawn(move || {
                    let desc = registry.get(&Counted).unwrap();
                    assert!(desc.is_empty());
                });
            }
        });

        assert_eq!(COUNTED_DECLARES.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_share_entries() {
        let registry = DescriptorRegistry::new();
        let first = registry.get(&Profile::default()).unwrap();
        let second = registry.clone().get(&Profile::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn name_clash_is_a_configuration_error() {
        let registry = DescriptorRegistry::new();
        registry.get(&Profile::default()).unwrap();
        let err = registry.get(&Impostor).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
