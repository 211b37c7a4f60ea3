//! Registry configuration.

use serde::{Deserialize, Serialize};

use crate::EcsError;

/// Tunables for an [`EntityRegistry`](crate::registry::EntityRegistry).
///
/// Missing fields fall back to their defaults when deserialized, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix of the generated `"<prefix>_<identity>"` name given to entities
    /// created without one.
    pub name_prefix: String,
    /// Initial capacity of the entity table.
    pub entity_capacity: usize,
    /// Initial capacity of each component store when it is first created.
    pub store_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name_prefix: "Entity".to_owned(),
            entity_capacity: 0,
            store_capacity: 0,
        }
    }
}

impl RegistryConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The name an unnamed entity with `identity` receives.
    pub fn default_name(&self, identity: u64) -> String {
        format!("{}_{}", self.name_prefix, identity)
    }
}
