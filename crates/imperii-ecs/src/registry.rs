//! The [`EntityRegistry`] owns the entity table and coordinates entity
//! lifecycle with the [`StorageRegistry`].
//!
//! # Locking
//!
//! Four independent lock domains exist: the entity table, the storage
//! registry (type -> store map only), each individual store, and the
//! statistics snapshot. Operations here hold at most one of them at a time.
//! The only nested acquisition in the crate is the integrity validator,
//! which always goes entity table -> storage registry -> store.
//!
//! # Destruction
//!
//! [`destroy_entity`](EntityRegistry::destroy_entity) runs as a small state
//! machine: validate and snapshot the claimed component types, detach them
//! from their stores, then re-validate and deactivate under the table's
//! write lock. A concurrent destroy of the same handle loses at the
//! re-validation step because the generation has already moved on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::component::{Component, ComponentTypeId};
use crate::config::RegistryConfig;
use crate::entity::{EntityHandle, EntityRecord, IdentityAllocator};
use crate::stats::StatisticsCache;
use crate::storage::StorageRegistry;
use crate::EcsError;

/// Steps of [`EntityRegistry::destroy_entity`].
#[derive(Debug)]
enum DestroyStep {
    /// Check the handle and snapshot the component types it claims.
    Validate,
    /// Remove the claimed components from their stores. No table lock held.
    Detach(Vec<ComponentTypeId>),
    /// Re-check the handle and deactivate under the table write lock.
    Commit,
    Done(bool),
}

/// Runs inside `add_shared_component` between the store insert and the claim.
#[cfg(test)]
pub(crate) type ClaimHook = Box<dyn FnOnce(&EntityRegistry) + Send>;

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Thread-safe owner of every entity record and component store.
///
/// All methods take `&self`; share the registry between threads with an
/// `Arc` or scoped borrows.
pub struct EntityRegistry {
    config: RegistryConfig,
    /// Identity -> record. Inactive records stay until
    /// [`cleanup_inactive_entities`](Self::cleanup_inactive_entities).
    pub(crate) entities: RwLock<HashMap<u64, EntityRecord>>,
    pub(crate) storage: StorageRegistry,
    allocator: IdentityAllocator,
    pub(crate) stats: StatisticsCache,
    #[cfg(test)]
    pub(crate) before_claim: parking_lot::Mutex<Option<ClaimHook>>,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entity_count", &self.entities.read().len())
            .field("store_count", &self.storage.len())
            .field("next_entity_id", &self.allocator.peek())
            .finish()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry sized and named by `config`.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            entities: RwLock::new(HashMap::with_capacity(config.entity_capacity)),
            storage: StorageRegistry::with_store_capacity(config.store_capacity),
            allocator: IdentityAllocator::new(),
            stats: StatisticsCache::new(),
            #[cfg(test)]
            before_claim: parking_lot::Mutex::new(None),
            config,
        }
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // -- internal helpers ---------------------------------------------------

    fn validate(&self, handle: EntityHandle) -> bool {
        self.entities
            .read()
            .get(&handle.identity())
            .is_some_and(|record| record.matches(handle))
    }

    /// Run `f` on the record `handle` refers to, if it is still valid.
    fn with_record_mut<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&mut EntityRecord) -> R,
    ) -> Option<R> {
        let mut entities = self.entities.write();
        let record = entities
            .get_mut(&handle.identity())
            .filter(|record| record.matches(handle))?;
        Some(f(record))
    }

    fn with_record<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&EntityRecord) -> R,
    ) -> Option<R> {
        let entities = self.entities.read();
        let record = entities
            .get(&handle.identity())
            .filter(|record| record.matches(handle))?;
        Some(f(record))
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity named `"<prefix>_<identity>"`.
    pub fn create_entity(&self) -> EntityHandle {
        self.create_named_entity("")
    }

    /// Create an entity with the given name. An empty name gets the default.
    pub fn create_named_entity(&self, name: impl Into<String>) -> EntityHandle {
        let identity = self.allocator.allocate();
        let name = name.into();
        let name = if name.is_empty() {
            self.config.default_name(identity)
        } else {
            name
        };

        let record = EntityRecord::new(identity, name);
        let handle = record.handle();
        self.entities.write().insert(identity, record);
        self.stats.invalidate();

        tracing::trace!(entity = %handle, "created entity");
        handle
    }

    /// Whether `handle` refers to an active entity at its current generation.
    pub fn is_entity_valid(&self, handle: EntityHandle) -> bool {
        self.validate(handle)
    }

    /// Destroy the entity `handle` refers to.
    ///
    /// Returns `false` without side effects if the handle is already invalid,
    /// and `false` if a concurrent destroy of the same entity committed first.
    pub fn destroy_entity(&self, handle: EntityHandle) -> bool {
        let mut step = DestroyStep::Validate;
        loop {
            step = match step {
                DestroyStep::Validate => match self.with_record(handle, |record| {
                    record.component_types.iter().copied().collect::<Vec<_>>()
                }) {
                    Some(types) => DestroyStep::Detach(types),
                    None => DestroyStep::Done(false),
                },
                DestroyStep::Detach(types) => {
                    for store in self.storage.erased_many(&types) {
                        store.remove(handle.identity());
                    }
                    DestroyStep::Commit
                }
                DestroyStep::Commit => {
                    let committed = self.with_record_mut(handle, EntityRecord::deactivate);
                    if committed.is_none() {
                        tracing::debug!(
                            entity = %handle,
                            "destroy lost re-validation to a concurrent destroy"
                        );
                    }
                    DestroyStep::Done(committed.is_some())
                }
                DestroyStep::Done(destroyed) => {
                    if destroyed {
                        self.stats.invalidate();
                        tracing::debug!(entity = %handle, "destroyed entity");
                    }
                    return destroyed;
                }
            };
        }
    }

    /// Destroy every active entity. Returns how many were destroyed.
    pub fn destroy_all_entities(&self) -> usize {
        self.all_active_entities()
            .into_iter()
            .filter(|&handle| self.destroy_entity(handle))
            .count()
    }

    /// Destroy every active entity that has a `T`. Returns how many were destroyed.
    pub fn destroy_entities_with_component<T: Component>(&self) -> usize {
        self.entities_with_component::<T>()
            .into_iter()
            .filter(|&handle| self.destroy_entity(handle))
            .count()
    }

    /// Physically erase inactive records. Returns how many were erased.
    ///
    /// This is the only operation that frees entity records; destruction only
    /// deactivates them.
    pub fn cleanup_inactive_entities(&self) -> usize {
        let removed = {
            let mut entities = self.entities.write();
            let before = entities.len();
            entities.retain(|_, record| record.active);
            before - entities.len()
        };
        if removed > 0 {
            self.stats.invalidate();
            tracing::debug!(removed, "cleaned up inactive entity records");
        }
        removed
    }

    // -- component access ---------------------------------------------------

    /// Attach `value` to the entity, replacing any existing `T`.
    ///
    /// Returns the shared instance now stored.
    pub fn add_component<T: Component>(
        &self,
        handle: EntityHandle,
        value: T,
    ) -> Result<Arc<T>, EcsError> {
        self.add_shared_component(handle, Arc::new(value))
    }

    /// Attach an already-shared instance to the entity, replacing any existing `T`.
    pub fn add_shared_component<T: Component>(
        &self,
        handle: EntityHandle,
        component: Arc<T>,
    ) -> Result<Arc<T>, EcsError> {
        if !self.validate(handle) {
            return Err(EcsError::StaleEntity { entity: handle });
        }

        let store = self.storage.get_or_create::<T>()?;
        let type_id = store.info().id;
        store.insert_shared(handle.identity(), Arc::clone(&component));

        #[cfg(test)]
        {
            let hook = self.before_claim.lock().take();
            if let Some(hook) = hook {
                hook(self);
            }
        }

        let claimed = self.with_record_mut(handle, |record| {
            record.component_types.insert(type_id);
            record.touch();
            record.refresh_memory_estimate();
        });
        self.stats.invalidate();

        if claimed.is_none() {
            // Destroyed between validation and the claim; undo our insert.
            store.remove_exact(handle.identity(), &component);
            tracing::warn!(
                entity = %handle,
                component_type = store.info().name,
                "entity destroyed while adding component; insert rolled back"
            );
            return Err(EcsError::StaleEntity { entity: handle });
        }

        tracing::trace!(entity = %handle, component_type = store.info().name, "added component");
        Ok(component)
    }

    /// The entity's `T`, or `None` if the handle is invalid or it has none.
    pub fn get_component<T: Component>(&self, handle: EntityHandle) -> Option<Arc<T>> {
        if !self.validate(handle) {
            return None;
        }
        self.storage.lookup::<T>()?.get(handle.identity())
    }

    /// Whether the entity has a `T`. `false` for an invalid handle.
    pub fn has_component<T: Component>(&self, handle: EntityHandle) -> bool {
        if !self.validate(handle) {
            return false;
        }
        self.storage
            .lookup::<T>()
            .is_some_and(|store| store.contains(handle.identity()))
    }

    /// Detach the entity's `T`. Returns whether one was removed.
    ///
    /// Callers still holding the instance keep a valid `Arc`.
    pub fn remove_component<T: Component>(&self, handle: EntityHandle) -> bool {
        if !self.validate(handle) {
            return false;
        }
        let Some(store) = self.storage.lookup::<T>() else {
            return false;
        };
        if store.remove(handle.identity()).is_none() {
            return false;
        }

        let type_id = store.info().id;
        self.with_record_mut(handle, |record| {
            record.component_types.remove(&type_id);
            record.touch();
            record.refresh_memory_estimate();
        });
        self.stats.invalidate();

        tracing::trace!(entity = %handle, component_type = store.info().name, "removed component");
        true
    }

    // -- bulk queries -------------------------------------------------------

    /// Current handles of active entities that have a `T`, sorted.
    ///
    /// Store entries whose identity is inactive or unknown are skipped; the
    /// integrity validator reports them as warnings.
    pub fn entities_with_component<T: Component>(&self) -> Vec<EntityHandle> {
        let Some(store) = self.storage.lookup::<T>() else {
            return Vec::new();
        };
        let identities = store.identities();

        let entities = self.entities.read();
        let mut handles: Vec<EntityHandle> = identities
            .into_iter()
            .filter_map(|identity| entities.get(&identity))
            .filter(|record| record.active)
            .map(EntityRecord::handle)
            .collect();
        drop(entities);

        handles.sort_unstable();
        handles
    }

    /// Current handles of every active entity, sorted.
    pub fn all_active_entities(&self) -> Vec<EntityHandle> {
        let mut handles: Vec<EntityHandle> = self
            .entities
            .read()
            .values()
            .filter(|record| record.active)
            .map(EntityRecord::handle)
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Every stored `T` paired with its active owner, sorted by handle.
    ///
    /// This is the iteration a save system uses to persist one component type.
    pub fn components<T: Component>(&self) -> Vec<(EntityHandle, Arc<T>)> {
        let Some(store) = self.storage.lookup::<T>() else {
            return Vec::new();
        };
        let stored = store.components();

        let entities = self.entities.read();
        let mut pairs: Vec<(EntityHandle, Arc<T>)> = stored
            .into_iter()
            .filter_map(|(identity, component)| {
                let record = entities.get(&identity).filter(|record| record.active)?;
                Some((record.handle(), component))
            })
            .collect();
        drop(entities);

        pairs.sort_unstable_by_key(|(handle, _)| *handle);
        pairs
    }

    // -- entity metadata ----------------------------------------------------

    /// The entity's name, or `None` if the handle is invalid.
    pub fn entity_name(&self, handle: EntityHandle) -> Option<String> {
        self.with_record(handle, |record| record.name.clone())
    }

    /// Rename the entity. Returns `false` if the handle is invalid.
    pub fn set_entity_name(&self, handle: EntityHandle, name: impl Into<String>) -> bool {
        let name = name.into();
        let renamed = self
            .with_record_mut(handle, |record| {
                record.name = name;
                record.touch();
                record.refresh_memory_estimate();
            })
            .is_some();
        if renamed {
            self.stats.invalidate();
        }
        renamed
    }

    /// The current generation of a valid handle's entity.
    pub fn entity_generation(&self, handle: EntityHandle) -> Option<u32> {
        self.with_record(handle, |record| record.generation)
    }

    /// A copy of the record `handle` refers to.
    pub fn entity_info(&self, handle: EntityHandle) -> Option<EntityRecord> {
        self.with_record(handle, EntityRecord::clone)
    }

    /// A copy of the active record with `identity`, whatever its generation.
    pub fn entity_info_by_id(&self, identity: u64) -> Option<EntityRecord> {
        self.entities
            .read()
            .get(&identity)
            .filter(|record| record.active)
            .cloned()
    }

    /// Upgrade a raw identity to the current handle of its active entity.
    pub fn current_handle(&self, identity: u64) -> Option<EntityHandle> {
        self.entities
            .read()
            .get(&identity)
            .filter(|record| record.active)
            .map(EntityRecord::handle)
    }

    /// A borrowed view binding `handle` to this registry.
    pub fn entity(&self, handle: EntityHandle) -> EntityRef<'_> {
        EntityRef {
            registry: self,
            handle,
        }
    }

    // -- diagnostics --------------------------------------------------------

    /// The identity the next created entity will receive.
    pub fn next_entity_id(&self) -> u64 {
        self.allocator.peek()
    }

    /// Bytes used by every record (active or not) plus every store.
    pub fn estimate_memory_usage(&self) -> usize {
        let records = self.entities.read().len() * std::mem::size_of::<EntityRecord>();
        let stores: usize = self
            .storage
            .all()
            .iter()
            .map(|store| store.memory_usage())
            .sum();
        records + stores
    }

    /// The key issued for `T`, once a `T` has been added to any entity.
    pub fn component_type_id<T: Component>(&self) -> Option<ComponentTypeId> {
        self.storage.type_id_of::<T>()
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// An entity handle bound to the registry it came from.
///
/// Every call goes through the registry and is generation-checked, so an
/// `EntityRef` held across a destroy simply starts reporting the entity as
/// gone.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    registry: &'a EntityRegistry,
    handle: EntityHandle,
}

impl EntityRef<'_> {
    /// The handle this view is bound to.
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// See [`EntityRegistry::is_entity_valid`].
    pub fn is_valid(&self) -> bool {
        self.registry.is_entity_valid(self.handle)
    }

    /// See [`EntityRegistry::entity_name`].
    pub fn name(&self) -> Option<String> {
        self.registry.entity_name(self.handle)
    }

    /// See [`EntityRegistry::get_component`].
    pub fn get<T: Component>(&self) -> Option<Arc<T>> {
        self.registry.get_component(self.handle)
    }

    /// See [`EntityRegistry::has_component`].
    pub fn has<T: Component>(&self) -> bool {
        self.registry.has_component::<T>(self.handle)
    }

    /// See [`EntityRegistry::add_component`].
    pub fn add<T: Component>(&self, value: T) -> Result<Arc<T>, EcsError> {
        self.registry.add_component(self.handle, value)
    }

    /// See [`EntityRegistry::remove_component`].
    pub fn remove<T: Component>(&self) -> bool {
        self.registry.remove_component::<T>(self.handle)
    }

    /// See [`EntityRegistry::destroy_entity`].
    pub fn destroy(self) -> bool {
        self.registry.destroy_entity(self.handle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
