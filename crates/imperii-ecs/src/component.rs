//! Component types and their registry-assigned keys.
//!
//! Each distinct Rust component type is issued a sequential
//! [`ComponentTypeId`] the first time a registry sees it. Storage routing
//! and entity records use that key rather than a hash of the type, so two
//! unrelated types can never collide.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker for types that can be attached to entities.
///
/// Components are shared between threads through `Arc`, so they must be
/// `Send + Sync`. The registry never synchronizes access to a component's
/// contents; types that are mutated after insertion need their own interior
/// locking.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Registry-local key for a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Position of this type in its registry, in order of first use.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Key assigned at registration time.
    pub id: ComponentTypeId,
    /// `std::any::type_name::<T>()`, used in statistics and diagnostics.
    pub name: &'static str,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

impl ComponentInfo {
    pub(crate) fn of<T: Component>(id: ComponentTypeId) -> Self {
        Self {
            id,
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentTypeRegistry
// ---------------------------------------------------------------------------

/// Issues a [`ComponentTypeId`] per Rust type, in order of first use.
///
/// Registering a type twice returns the key issued the first time. Metadata
/// lives with each store, not here.
#[derive(Debug, Default)]
pub(crate) struct ComponentTypeRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
}

impl ComponentTypeRegistry {
    /// Register `T`, issuing the next sequential key if it is new.
    pub(crate) fn register<T: Component>(&mut self) -> ComponentTypeId {
        let next = ComponentTypeId(self.by_type.len() as u32);
        *self.by_type.entry(TypeId::of::<T>()).or_insert(next)
    }

    /// The key for `T`, if it has been registered.
    pub(crate) fn lookup<T: Component>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
