//! Read-mostly cache in front of the lookup collaborators.
//!
//! The compiler only reads through it. Whoever owns the underlying store
//! calls [`CachedLookup::invalidate`] when a category, property or concept
//! page changes.

use std::collections::HashMap;
use std::sync::RwLock;

use semq_core::{
    EntityId, EntityLookup, HierarchyKind, HierarchyLookup, LookupError, ValueType, WikiPage,
};
use semq_description::{ConceptStore, Description};

type HierarchyKey = (WikiPage, HierarchyKind);

/// Caching wrapper around a lookup implementation.
pub struct CachedLookup<L> {
    inner: L,
    children: RwLock<HashMap<HierarchyKey, Vec<WikiPage>>>,
    ids: RwLock<HashMap<WikiPage, Option<EntityId>>>,
    types: RwLock<HashMap<WikiPage, ValueType>>,
    concepts: RwLock<HashMap<WikiPage, Option<Description>>>,
}

impl<L> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            children: RwLock::new(HashMap::new()),
            ids: RwLock::new(HashMap::new()),
            types: RwLock::new(HashMap::new()),
            concepts: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Forget everything derived from `page`.
    ///
    /// Hierarchy entries are dropped wholesale since a changed category can
    /// affect the closure of any ancestor.
    pub fn invalidate(&self, page: &WikiPage) {
        if let Ok(mut ids) = self.ids.write() {
            ids.remove(page);
        }
        if let Ok(mut types) = self.types.write() {
            types.remove(page);
        }
        if let Ok(mut concepts) = self.concepts.write() {
            concepts.remove(page);
        }
        if let Ok(mut children) = self.children.write() {
            children.clear();
        }
        tracing::debug!(page = %page, "lookup cache invalidated");
    }

    pub fn clear(&self) {
        if let Ok(mut ids) = self.ids.write() {
            ids.clear();
        }
        if let Ok(mut types) = self.types.write() {
            types.clear();
        }
        if let Ok(mut concepts) = self.concepts.write() {
            concepts.clear();
        }
        if let Ok(mut children) = self.children.write() {
            children.clear();
        }
    }
}

/// Read `key` from `cache`, falling back to `fetch` and remembering its
/// answer. A poisoned lock bypasses the cache.
fn cached<K, V, F>(cache: &RwLock<HashMap<K, V>>, key: K, fetch: F) -> Result<V, LookupError>
where
    K: std::hash::Hash + Eq,
    V: Clone,
    F: FnOnce() -> Result<V, LookupError>,
{
    if let Ok(map) = cache.read() {
        if let Some(hit) = map.get(&key) {
            return Ok(hit.clone());
        }
    }
    let value = fetch()?;
    if let Ok(mut map) = cache.write() {
        map.insert(key, value.clone());
    }
    Ok(value)
}

impl<L: HierarchyLookup> HierarchyLookup for CachedLookup<L> {
    fn children_of(
        &self,
        page: &WikiPage,
        kind: HierarchyKind,
    ) -> Result<Vec<WikiPage>, LookupError> {
        cached(&self.children, (page.clone(), kind), || {
            self.inner.children_of(page, kind)
        })
    }
}

impl<L: EntityLookup> EntityLookup for CachedLookup<L> {
    fn id_for(&self, page: &WikiPage) -> Result<Option<EntityId>, LookupError> {
        cached(&self.ids, page.clone(), || self.inner.id_for(page))
    }

    fn property_type(&self, property: &WikiPage) -> Result<ValueType, LookupError> {
        cached(&self.types, property.clone(), || {
            self.inner.property_type(property)
        })
    }
}

impl<L: ConceptStore> ConceptStore for CachedLookup<L> {
    fn definition_of(&self, concept: &WikiPage) -> Result<Option<Description>, LookupError> {
        cached(&self.concepts, concept.clone(), || {
            self.inner.definition_of(concept)
        })
    }
}
