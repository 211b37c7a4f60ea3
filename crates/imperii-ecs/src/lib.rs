//! Imperii ECS -- thread-safe entity and component storage with
//! generation-checked handles.
//!
//! Entities are referenced through [`EntityHandle`](entity::EntityHandle)s that
//! pair a never-reused identity with a generation. Destroying an entity bumps
//! its generation, so every handle issued before the destroy is rejected from
//! then on. Components live in one [`ComponentStore`](storage::ComponentStore)
//! per type, each behind its own reader/writer lock, and are handed out as
//! shared `Arc`s.
//!
//! # Quick Start
//!
//! ```
//! use imperii_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! let registry = EntityRegistry::new();
//! let entity = registry.create_entity();
//! registry.add_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//!
//! assert_eq!(
//!     registry.get_component::<Position>(entity).as_deref(),
//!     Some(&Position { x: 0.0, y: 0.0 })
//! );
//!
//! assert!(registry.destroy_entity(entity));
//! assert!(registry.get_component::<Position>(entity).is_none());
//! assert_eq!(registry.statistics().active_entities, 0);
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod config;
pub mod entity;
pub mod integrity;
pub mod registry;
pub mod stats;
pub mod storage;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The handle is unset, stale, or refers to a destroyed entity.
    #[error("entity {entity} is not valid (destroyed, stale generation, or never allocated)")]
    StaleEntity {
        entity: entity::EntityHandle,
    },

    /// A store registered for a type key held a different Rust type.
    #[error("component store for '{type_name}' holds a different type than requested")]
    StoreTypeMismatch {
        type_name: &'static str,
    },

    /// A registry configuration document could not be parsed.
    #[error("invalid registry configuration: {0}")]
    Config(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentInfo, ComponentTypeId};
    pub use crate::config::RegistryConfig;
    pub use crate::entity::{EntityHandle, EntityRecord};
    pub use crate::integrity::{IntegrityIssue, ValidationReport};
    pub use crate::registry::{EntityRef, EntityRegistry};
    pub use crate::stats::EntityStatistics;
    pub use crate::storage::{ComponentStore, ErasedStore, StorageRegistry};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Scenario Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[test]
    fn destroy_invalidates_old_handle_and_statistics() {
        let registry = EntityRegistry::new();
        let e1 = registry.create_entity();
        assert_eq!(e1, EntityHandle::new(1, 1));

        registry
            .add_component(e1, Position { x: 0.0, y: 0.0 })
            .unwrap();
        assert!(registry.destroy_entity(e1));

        let record = registry.entity_info_by_id(1);
        assert!(record.is_none(), "destroyed entity is not reported as active");
        assert_eq!(registry.current_handle(1), None);
        assert!(registry.get_component::<Position>(e1).is_none());
        assert_eq!(registry.statistics().active_entities, 0);
        assert_eq!(registry.statistics().total_entities, 1);
    }

    #[test]
    fn generation_advances_to_two_on_destroy() {
        let registry = EntityRegistry::new();
        let e1 = registry.create_entity();
        registry.destroy_entity(e1);
        assert!(registry.validate_integrity().is_valid());

        // The record stays in the table until cleanup, with generation 2.
        assert_eq!(registry.entities.read().get(&1).map(|r| r.generation), Some(2));
        let stats = registry.statistics();
        assert_eq!(stats.total_entities, 1);
        assert_eq!(stats.active_entities, 0);
        assert_eq!(registry.cleanup_inactive_entities(), 1);
        assert_eq!(registry.statistics().total_entities, 0);
    }

    #[test]
    fn entities_with_component_ignores_unrelated_destroy() {
        let registry = EntityRegistry::new();
        let e1 = registry.create_entity();
        let e2 = registry.create_entity();
        let e3 = registry.create_entity();
        registry.add_component(e1, Health(10)).unwrap();
        registry.add_component(e3, Health(30)).unwrap();

        assert_eq!(registry.entities_with_component::<Health>(), vec![e1, e3]);
        assert!(registry.destroy_entity(e2));
        assert_eq!(registry.entities_with_component::<Health>(), vec![e1, e3]);
    }

    #[test]
    fn second_destroy_returns_false() {
        let registry = EntityRegistry::new();
        let e = registry.create_entity();
        assert!(registry.destroy_entity(e));
        assert!(!registry.destroy_entity(e));
        assert!(!registry.is_entity_valid(e));
    }

    #[test]
    fn remove_component_twice() {
        let registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.add_component(e, Health(1)).unwrap();
        assert!(registry.remove_component::<Health>(e));
        assert!(!registry.remove_component::<Health>(e));
    }

    #[test]
    fn add_on_destroyed_entity_is_an_error() {
        let registry = EntityRegistry::new();
        let e = registry.create_entity();
        registry.destroy_entity(e);
        let err = registry.add_component(e, Health(5)).unwrap_err();
        assert!(matches!(err, EcsError::StaleEntity { entity } if entity == e));
    }

    #[test]
    fn statistics_track_components_per_type() {
        let registry = EntityRegistry::new();
        for i in 0..4 {
            let e = registry.create_entity();
            registry.add_component(e, Health(i)).unwrap();
            if i % 2 == 0 {
                registry
                    .add_component(e, Position { x: 0.0, y: 0.0 })
                    .unwrap();
            }
        }

        let stats = registry.statistics();
        assert_eq!(stats.active_entities, 4);
        assert_eq!(stats.total_components, 6);
        assert_eq!(stats.average_components_per_entity, 1.5);
        let health_name = std::any::type_name::<Health>();
        assert_eq!(stats.component_counts.get(health_name), Some(&4));
        assert_eq!(
            stats.component_memory_usage.get(health_name),
            Some(&(4 * std::mem::size_of::<Health>()))
        );
    }
}
