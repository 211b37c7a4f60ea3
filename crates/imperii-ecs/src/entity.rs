//! Entity handles, records, and identity allocation.
//!
//! An [`EntityHandle`] pairs a 64-bit *identity* with a 32-bit *generation*.
//! Identities are minted once from a monotonically increasing counter and are
//! never reused. The generation of a record is bumped exactly once, when the
//! entity is destroyed, so every handle issued before destruction becomes
//! permanently stale.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;

// ---------------------------------------------------------------------------
// EntityHandle
// ---------------------------------------------------------------------------

/// A generation-checked reference to an entity.
///
/// Handles compare equal only when both identity and generation match, and
/// order by identity first, then generation. Identity `0` is the
/// [`INVALID`](Self::INVALID) sentinel and is never issued by a registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityHandle {
    identity: u64,
    generation: u32,
}

impl EntityHandle {
    /// The unset / invalid handle.
    pub const INVALID: EntityHandle = EntityHandle {
        identity: 0,
        generation: 0,
    };

    /// Construct a handle from an identity and generation.
    #[inline]
    pub const fn new(identity: u64, generation: u32) -> Self {
        Self {
            identity,
            generation,
        }
    }

    /// The raw numeric identity. Component stores are keyed by this value.
    #[inline]
    pub const fn identity(self) -> u64 {
        self.identity
    }

    /// The generation this handle was issued for.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns `false` for the [`INVALID`](Self::INVALID) sentinel.
    ///
    /// This only inspects the handle itself. Whether the entity is still
    /// alive is answered by
    /// [`EntityRegistry::is_entity_valid`](crate::registry::EntityRegistry::is_entity_valid).
    #[inline]
    pub const fn is_set(self) -> bool {
        self.identity != 0
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({}v{})", self.identity, self.generation)
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.identity, self.generation)
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Authoritative bookkeeping for one entity, owned by the registry's table.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    /// Raw identity, never reused.
    pub identity: u64,
    /// Current generation. Starts at 1 and increments once, on destruction.
    pub generation: u32,
    /// `false` once the entity has been destroyed.
    pub active: bool,
    /// Human-readable name.
    pub name: String,
    /// Component types a live instance is expected to exist for.
    pub component_types: BTreeSet<ComponentTypeId>,
    /// Rough heap + inline footprint of this record in bytes.
    pub memory_usage_estimate: usize,
    /// Wall-clock creation time.
    pub created_at: SystemTime,
    /// Wall-clock time of the last mutation of this record.
    pub last_modified_at: SystemTime,
}

impl EntityRecord {
    pub(crate) fn new(identity: u64, name: String) -> Self {
        let now = SystemTime::now();
        let mut record = Self {
            identity,
            generation: 1,
            active: true,
            name,
            component_types: BTreeSet::new(),
            memory_usage_estimate: 0,
            created_at: now,
            last_modified_at: now,
        };
        record.refresh_memory_estimate();
        record
    }

    /// The handle matching this record's current generation.
    pub fn handle(&self) -> EntityHandle {
        EntityHandle::new(self.identity, self.generation)
    }

    /// Whether `handle` refers to this record in its current, active state.
    pub fn matches(&self, handle: EntityHandle) -> bool {
        self.active && self.identity == handle.identity && self.generation == handle.generation
    }

    pub(crate) fn touch(&mut self) {
        self.last_modified_at = SystemTime::now();
    }

    pub(crate) fn refresh_memory_estimate(&mut self) {
        self.memory_usage_estimate = std::mem::size_of::<Self>()
            + self.name.capacity()
            + self.component_types.len() * std::mem::size_of::<ComponentTypeId>();
    }

    /// Active -> inactive transition. Invalidates every outstanding handle.
    pub(crate) fn deactivate(&mut self) {
        self.active = false;
        self.generation += 1;
        self.component_types.clear();
        self.touch();
        self.refresh_memory_estimate();
    }
}

// ---------------------------------------------------------------------------
// IdentityAllocator
// ---------------------------------------------------------------------------

/// Lock-free source of fresh entity identities.
///
/// Identities start at 1 (0 is the invalid sentinel) and only ever grow.
#[derive(Debug)]
pub struct IdentityAllocator {
    next: AtomicU64,
}

impl IdentityAllocator {
    /// Create an allocator whose first identity is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next identity.
    ///
    /// # Panics
    ///
    /// Panics if the 64-bit identity space is exhausted. The counter never
    /// wraps, so a previously issued identity can never be handed out again.
    pub fn allocate(&self) -> u64 {
        match self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
        {
            Ok(identity) => identity,
            Err(_) => panic!("entity identity space exhausted"),
        }
    }

    /// The identity the next call to [`allocate`](Self::allocate) will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
