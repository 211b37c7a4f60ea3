//! Per-type component stores and the type-erased registry that routes to them.
//!
//! A [`ComponentStore<T>`] is a homogeneous map from raw entity identity to a
//! shared `Arc<T>`, guarded by its own reader/writer lock. It knows nothing
//! about generations or entity validity; the
//! [`EntityRegistry`](crate::registry::EntityRegistry) checks handles before
//! it ever reaches a store.
//!
//! The [`StorageRegistry`] holds one store per component type behind the
//! object-safe [`ErasedStore`] trait. Its lock guards only the type -> store
//! map, never the contents of a store, so operations on different component
//! types never contend with each other once the store has been resolved.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::component::{Component, ComponentInfo, ComponentTypeId, ComponentTypeRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// All live components of type `T`, keyed by raw entity identity.
pub struct ComponentStore<T> {
    info: ComponentInfo,
    components: RwLock<HashMap<u64, Arc<T>>>,
}

impl<T: Component> ComponentStore<T> {
    /// Create an empty store for the type registered under `id`.
    pub fn new(id: ComponentTypeId) -> Self {
        Self::with_capacity(id, 0)
    }

    /// Create an empty store with room for `capacity` components.
    pub fn with_capacity(id: ComponentTypeId, capacity: usize) -> Self {
        Self {
            info: ComponentInfo::of::<T>(id),
            components: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Metadata of the stored type.
    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    /// Insert `value` for `identity`, replacing any previous instance.
    ///
    /// Returns the newly shared instance.
    pub fn insert(&self, identity: u64, value: T) -> Arc<T> {
        let component = Arc::new(value);
        self.components
            .write()
            .insert(identity, Arc::clone(&component));
        component
    }

    /// Insert an already-shared instance, returning the one it replaced.
    pub fn insert_shared(&self, identity: u64, component: Arc<T>) -> Option<Arc<T>> {
        self.components.write().insert(identity, component)
    }

    /// The instance stored for `identity`, if any.
    pub fn get(&self, identity: u64) -> Option<Arc<T>> {
        self.components.read().get(&identity).cloned()
    }

    /// Whether an instance is stored for `identity`.
    pub fn contains(&self, identity: u64) -> bool {
        self.components.read().contains_key(&identity)
    }

    /// Detach the instance stored for `identity`.
    ///
    /// Outstanding `Arc`s handed out earlier stay valid; only the map entry
    /// goes away.
    pub fn remove(&self, identity: u64) -> Option<Arc<T>> {
        self.components.write().remove(&identity)
    }

    /// Detach the entry for `identity` only if it is still `expected`.
    ///
    /// Used to undo an insert without clobbering a newer instance another
    /// thread stored in the meantime.
    pub fn remove_exact(&self, identity: u64, expected: &Arc<T>) -> bool {
        let mut components = self.components.write();
        match components.get(&identity) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                components.remove(&identity);
                true
            }
            _ => false,
        }
    }

    /// Number of stored instances.
    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    /// Whether the store holds no instances.
    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }

    /// Estimated bytes held by the stored values (`len * size_of::<T>()`).
    pub fn memory_usage(&self) -> usize {
        self.len() * self.info.size
    }

    /// Identities that currently have an instance, in no particular order.
    pub fn identities(&self) -> Vec<u64> {
        self.components.read().keys().copied().collect()
    }

    /// Every `(identity, instance)` pair, in no particular order.
    pub fn components(&self) -> Vec<(u64, Arc<T>)> {
        self.components
            .read()
            .iter()
            .map(|(&identity, component)| (identity, Arc::clone(component)))
            .collect()
    }
}

impl<T> fmt::Debug for ComponentStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStore")
            .field("type", &self.info.name)
            .field("id", &self.info.id)
            .field("len", &self.components.read().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ErasedStore
// ---------------------------------------------------------------------------

/// Type-erased view over a [`ComponentStore<T>`].
///
/// Everything the registry needs without knowing `T`: destruction detaches
/// through [`remove`](Self::remove), statistics use the counters, the
/// integrity validator uses [`contains`](Self::contains) and
/// [`identities`](Self::identities).
pub trait ErasedStore: Send + Sync + 'static {
    /// Metadata of the stored type.
    fn info(&self) -> &ComponentInfo;
    /// Whether an instance is stored for `identity`.
    fn contains(&self, identity: u64) -> bool;
    /// Returns whether an instance was detached.
    fn remove(&self, identity: u64) -> bool;
    /// Number of stored instances.
    fn len(&self) -> usize;
    /// Whether the store holds no instances.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Estimated bytes held by the stored values.
    fn memory_usage(&self) -> usize;
    /// Identities that currently have an instance.
    fn identities(&self) -> Vec<u64>;
    /// Upcast for `Arc::downcast` back to the concrete store.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn contains(&self, identity: u64) -> bool {
        ComponentStore::contains(self, identity)
    }

    fn remove(&self, identity: u64) -> bool {
        ComponentStore::remove(self, identity).is_some()
    }

    fn len(&self) -> usize {
        ComponentStore::len(self)
    }

    fn memory_usage(&self) -> usize {
        ComponentStore::memory_usage(self)
    }

    fn identities(&self) -> Vec<u64> {
        ComponentStore::identities(self)
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for dyn ErasedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedStore")
            .field("type", &self.info().name)
            .field("id", &self.info().id)
            .field("len", &self.len())
            .finish()
    }
}

fn downcast_store<T: Component>(
    store: &Arc<dyn ErasedStore>,
) -> Result<Arc<ComponentStore<T>>, EcsError> {
    Arc::clone(store)
        .into_any_arc()
        .downcast::<ComponentStore<T>>()
        .map_err(|_| EcsError::StoreTypeMismatch {
            type_name: std::any::type_name::<T>(),
        })
}

// ---------------------------------------------------------------------------
// StorageRegistry
// ---------------------------------------------------------------------------

/// Type keys and their stores, guarded together by the registry lock.
#[derive(Debug, Default)]
pub(crate) struct StorageTable {
    pub(crate) types: ComponentTypeRegistry,
    /// Indexed by `ComponentTypeId::index`.
    pub(crate) stores: Vec<Arc<dyn ErasedStore>>,
}

impl StorageTable {
    pub(crate) fn store(&self, id: ComponentTypeId) -> Option<&Arc<dyn ErasedStore>> {
        self.stores.get(id.index())
    }
}

/// Map from component type to its [`ComponentStore`], created lazily.
#[derive(Debug, Default)]
pub struct StorageRegistry {
    table: RwLock<StorageTable>,
    store_capacity: usize,
}

impl StorageRegistry {
    /// An empty registry whose stores start with no reserved capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose stores start with room for `store_capacity` entries.
    pub fn with_store_capacity(store_capacity: usize) -> Self {
        Self {
            table: RwLock::default(),
            store_capacity,
        }
    }

    /// The store for `T`, or `None` if no component of that type was ever added.
    pub fn lookup<T: Component>(&self) -> Option<Arc<ComponentStore<T>>> {
        let table = self.table.read();
        let id = table.types.lookup::<T>()?;
        let store = table.store(id)?;
        downcast_store::<T>(store).ok()
    }

    /// The store for `T`, creating and registering it on first use.
    ///
    /// Double-checked: the common case only takes the read lock.
    pub fn get_or_create<T: Component>(&self) -> Result<Arc<ComponentStore<T>>, EcsError> {
        {
            let table = self.table.read();
            if let Some(store) = table.types.lookup::<T>().and_then(|id| table.store(id)) {
                return downcast_store::<T>(store);
            }
        }

        let mut table = self.table.write();
        if let Some(store) = table.types.lookup::<T>().and_then(|id| table.store(id)) {
            return downcast_store::<T>(store);
        }

        let id = table.types.register::<T>();
        let store = Arc::new(ComponentStore::<T>::with_capacity(id, self.store_capacity));
        debug_assert_eq!(table.stores.len(), id.index());
        table.stores.push(Arc::clone(&store) as Arc<dyn ErasedStore>);
        tracing::debug!(
            component_type_id = ?id,
            component_type = std::any::type_name::<T>(),
            "created component store"
        );
        Ok(store)
    }

    /// The key issued for `T`, if a store exists for it.
    pub fn type_id_of<T: Component>(&self) -> Option<ComponentTypeId> {
        self.table.read().types.lookup::<T>()
    }

    /// Erased store for a key.
    pub fn erased(&self, id: ComponentTypeId) -> Option<Arc<dyn ErasedStore>> {
        self.table.read().store(id).cloned()
    }

    /// Erased stores for every key in `ids` that has one, resolved under a
    /// single acquisition of the registry lock.
    pub fn erased_many<'a, I>(&self, ids: I) -> Vec<Arc<dyn ErasedStore>>
    where
        I: IntoIterator<Item = &'a ComponentTypeId>,
    {
        let table = self.table.read();
        ids.into_iter()
            .filter_map(|&id| table.store(id).cloned())
            .collect()
    }

    /// Every registered store, in key order.
    pub fn all(&self) -> Vec<Arc<dyn ErasedStore>> {
        self.table.read().stores.clone()
    }

    /// Number of component types with a store.
    pub fn len(&self) -> usize {
        self.table.read().stores.len()
    }

    /// Whether no store has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold the registry lock for a consistent multi-store read.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StorageTable> {
        self.table.read()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[test]
    fn store_insert_get_remove() {
        let store = ComponentStore::<Pos>::new(ComponentTypeId(0));
        let inserted = store.insert(7, Pos { x: 1.0, y: 2.0 });

        assert!(store.contains(7));
        assert_eq!(store.get(7).as_deref(), Some(&Pos { x: 1.0, y: 2.0 }));
        assert!(Arc::ptr_eq(&inserted, &store.get(7).unwrap()));
        assert_eq!(store.len(), 1);

        assert!(store.remove(7).is_some());
        assert!(store.remove(7).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn removal_does_not_invalidate_outstanding_refs() {
        let store = ComponentStore::<Health>::new(ComponentTypeId(0));
        let held = store.insert(1, Health(10));
        store.remove(1);
        assert_eq!(*held, Health(10));
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn insert_replaces_previous_instance() {
        let store = ComponentStore::<Health>::new(ComponentTypeId(0));
        store.insert(1, Health(10));
        let previous = store.insert_shared(1, Arc::new(Health(20)));
        assert_eq!(previous.as_deref(), Some(&Health(10)));
        assert_eq!(store.get(1).as_deref(), Some(&Health(20)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_exact_leaves_newer_instance_alone() {
        let store = ComponentStore::<Health>::new(ComponentTypeId(0));
        let old = store.insert(1, Health(1));
        let _new = store.insert(1, Health(2));
        assert!(!store.remove_exact(1, &old));
        assert!(store.contains(1));

        let current = store.get(1).unwrap();
        assert!(store.remove_exact(1, &current));
        assert!(!store.contains(1));
    }

    #[test]
    fn memory_usage_is_count_times_size() {
        let store = ComponentStore::<Pos>::new(ComponentTypeId(0));
        store.insert(1, Pos { x: 0.0, y: 0.0 });
        store.insert(2, Pos { x: 0.0, y: 0.0 });
        assert_eq!(store.memory_usage(), 2 * std::mem::size_of::<Pos>());
    }

    #[test]
    fn registry_creates_store_once_and_downcasts() {
        let registry = StorageRegistry::new();
        assert!(registry.lookup::<Pos>().is_none());

        let a = registry.get_or_create::<Pos>().unwrap();
        let b = registry.get_or_create::<Pos>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        a.insert(3, Pos { x: 5.0, y: 6.0 });
        let looked_up = registry.lookup::<Pos>().unwrap();
        assert_eq!(looked_up.get(3).as_deref(), Some(&Pos { x: 5.0, y: 6.0 }));
    }

    #[test]
    fn distinct_types_get_distinct_sequential_keys() {
        let registry = StorageRegistry::new();
        registry.get_or_create::<Pos>().unwrap();
        registry.get_or_create::<Health>().unwrap();

        let pos = registry.type_id_of::<Pos>().unwrap();
        let health = registry.type_id_of::<Health>().unwrap();
        assert_eq!(pos.index(), 0);
        assert_eq!(health.index(), 1);

        let erased = registry.erased(health).unwrap();
        assert_eq!(erased.info().id, health);
        assert!(erased.info().name.ends_with("Health"));
    }

    #[test]
    fn erased_remove_reaches_typed_store() {
        let registry = StorageRegistry::new();
        let store = registry.get_or_create::<Health>().unwrap();
        store.insert(9, Health(1));

        let id = registry.type_id_of::<Health>().unwrap();
        let erased = registry.erased_many(&[id, ComponentTypeId(42)]);
        assert_eq!(erased.len(), 1);
        assert!(erased[0].remove(9));
        assert!(!erased[0].remove(9));
        assert!(!store.contains(9));
    }
}
