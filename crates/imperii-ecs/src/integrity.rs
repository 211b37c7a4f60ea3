//! Cross-check of entity records against the stores.
//!
//! Not on any hot path. The validator holds the entity table and storage
//! registry read locks for the whole pass, but stores are only read-locked one
//! at a time and mutations touch a store before they update the record. A
//! report taken while components are being added or removed can therefore
//! carry transient `MissingComponent` or `UnclaimedComponent` errors that a
//! later pass no longer sees.

use serde::Serialize;

use crate::component::ComponentTypeId;
use crate::entity::EntityHandle;
use crate::registry::EntityRegistry;

/// One inconsistency found by [`EntityRegistry::validate_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum IntegrityIssue {
    /// An active record claims a type no store exists for.
    #[error("{entity} claims component type {component_type} but no store exists for it")]
    MissingStore {
        entity: EntityHandle,
        component_type: ComponentTypeId,
    },

    /// An active record claims a type its store has no instance for.
    #[error("{entity} claims {type_name} but its store has no instance")]
    MissingComponent {
        entity: EntityHandle,
        component_type: ComponentTypeId,
        type_name: &'static str,
    },

    /// A store holds an instance for an active record that does not claim it.
    #[error("{entity} has a {type_name} instance it does not claim")]
    UnclaimedComponent {
        entity: EntityHandle,
        component_type: ComponentTypeId,
        type_name: &'static str,
    },

    /// A store holds an instance for a destroyed entity.
    #[error("orphaned {type_name} for inactive entity {identity}")]
    OrphanedInactive {
        identity: u64,
        component_type: ComponentTypeId,
        type_name: &'static str,
    },

    /// A store holds an instance for an identity with no record at all.
    #[error("orphaned {type_name} for unknown entity {identity}")]
    OrphanedUnknown {
        identity: u64,
        component_type: ComponentTypeId,
        type_name: &'static str,
    },
}

impl IntegrityIssue {
    /// Orphans are recoverable and reported as warnings; the rest are errors.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::OrphanedInactive { .. } | Self::OrphanedUnknown { .. }
        )
    }
}

/// Result of [`EntityRegistry::validate_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<IntegrityIssue>,
    pub warnings: Vec<IntegrityIssue>,
}

impl ValidationReport {
    /// `true` when no errors were found. Warnings do not fail validation.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, issue: IntegrityIssue) {
        if issue.is_warning() {
            tracing::warn!(%issue, "integrity warning");
            self.warnings.push(issue);
        } else {
            tracing::warn!(%issue, "integrity error");
            self.errors.push(issue);
        }
    }
}

impl EntityRegistry {
    /// Check every claim against the stores and every stored instance
    /// against the claims.
    pub fn validate_integrity(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        let entities = self.entities.read();
        let table = self.storage.read();

        let mut active: Vec<_> = entities.values().filter(|record| record.active).collect();
        active.sort_unstable_by_key(|record| record.identity);

        for record in active {
            for &component_type in &record.component_types {
                match table.store(component_type) {
                    None => report.push(IntegrityIssue::MissingStore {
                        entity: record.handle(),
                        component_type,
                    }),
                    Some(store) if !store.contains(record.identity) => {
                        report.push(IntegrityIssue::MissingComponent {
                            entity: record.handle(),
                            component_type,
                            type_name: store.info().name,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for store in &table.stores {
            let component_type = store.info().id;
            let type_name = store.info().name;
            let mut identities = store.identities();
            identities.sort_unstable();

            for identity in identities {
                match entities.get(&identity) {
                    Some(record) if record.active => {
                        if !record.component_types.contains(&component_type) {
                            report.push(IntegrityIssue::UnclaimedComponent {
                                entity: record.handle(),
                                component_type,
                                type_name,
                            });
                        }
                    }
                    Some(_) => report.push(IntegrityIssue::OrphanedInactive {
                        identity,
                        component_type,
                        type_name,
                    }),
                    None => report.push(IntegrityIssue::OrphanedUnknown {
                        identity,
                        component_type,
                        type_name,
                    }),
                }
            }
        }

        report
    }
}
