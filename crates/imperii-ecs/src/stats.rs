//! Lazily recomputed aggregate statistics.
//!
//! Every mutation of the registry marks the cache dirty. The next read
//! rebuilds the whole snapshot with a single walk of the entity table and of
//! every store; counters are never updated incrementally.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use serde::Serialize;

use crate::registry::EntityRegistry;

/// A point-in-time summary of a registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityStatistics {
    /// Records in the table, inactive ones included until cleanup.
    pub total_entities: usize,
    pub active_entities: usize,
    /// Instances across every store.
    pub total_components: usize,
    /// Active record estimates plus store memory.
    pub memory_usage_bytes: usize,
    /// `total_components / active_entities`, or 0 with no active entities.
    pub average_components_per_entity: f64,
    /// Instance count per component type name.
    pub component_counts: BTreeMap<String, usize>,
    /// Store memory per component type name.
    pub component_memory_usage: BTreeMap<String, usize>,
    /// How long the last recompute took.
    pub last_update_time: Duration,
    pub last_calculated: Option<SystemTime>,
}

impl fmt::Display for EntityStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Entity Registry ===")?;
        writeln!(f, "Total Entities: {}", self.total_entities)?;
        writeln!(f, "Active Entities: {}", self.active_entities)?;
        writeln!(f, "Total Components: {}", self.total_components)?;
        writeln!(
            f,
            "Memory Usage: {:.2} KB",
            self.memory_usage_bytes as f64 / 1024.0
        )?;
        writeln!(
            f,
            "Avg Components/Entity: {:.2}",
            self.average_components_per_entity
        )?;
        writeln!(f, "Last Update Time: {:?}", self.last_update_time)?;

        if !self.component_counts.is_empty() {
            writeln!(f, "Component Types:")?;
        }
        for (type_name, count) in &self.component_counts {
            let memory = self
                .component_memory_usage
                .get(type_name)
                .copied()
                .unwrap_or(0);
            writeln!(
                f,
                "  {type_name}: {count} instances, {:.2} KB",
                memory as f64 / 1024.0
            )?;
        }
        Ok(())
    }
}

/// Cached [`EntityStatistics`] plus the dirty flag that invalidates it.
#[derive(Debug)]
pub(crate) struct StatisticsCache {
    snapshot: RwLock<EntityStatistics>,
    dirty: AtomicBool,
}

impl StatisticsCache {
    /// Starts dirty so the first read computes.
    pub(crate) fn new() -> Self {
        Self {
            snapshot: RwLock::new(EntityStatistics::default()),
            dirty: AtomicBool::new(true),
        }
    }

    pub(crate) fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

impl EntityRegistry {
    /// The current statistics, recomputed first if anything changed.
    pub fn statistics(&self) -> EntityStatistics {
        if self.stats.is_dirty() {
            self.recompute_statistics(false);
        }
        self.stats.snapshot.read().clone()
    }

    /// Recompute unconditionally and return the fresh snapshot.
    pub fn refresh_statistics(&self) -> EntityStatistics {
        self.recompute_statistics(true);
        self.stats.snapshot.read().clone()
    }

    /// Active entities, from the cached snapshot.
    pub fn active_entity_count(&self) -> usize {
        self.statistics().active_entities
    }

    /// Stored instances across all types, from the cached snapshot.
    pub fn total_component_count(&self) -> usize {
        self.statistics().total_components
    }

    /// Emit the statistics report at `info` level.
    pub fn log_debug_info(&self) {
        let stats = self.statistics();
        tracing::info!(
            total_entities = stats.total_entities,
            active_entities = stats.active_entities,
            total_components = stats.total_components,
            "\n{stats}"
        );
    }

    fn recompute_statistics(&self, force: bool) {
        let mut snapshot = self.stats.snapshot.write();
        // Another reader may have finished a recompute while we waited.
        if !force && !self.stats.is_dirty() {
            return;
        }
        // Cleared before the walk: a mutation racing it marks us dirty again.
        self.stats.dirty.store(false, Ordering::Release);

        let start = Instant::now();
        let mut stats = EntityStatistics::default();

        {
            let entities = self.entities.read();
            stats.total_entities = entities.len();
            for record in entities.values().filter(|record| record.active) {
                stats.active_entities += 1;
                stats.memory_usage_bytes += record.memory_usage_estimate;
            }
        }

        for store in self.storage.all() {
            let count = store.len();
            let memory = store.memory_usage();
            let type_name = store.info().name.to_owned();
            stats.total_components += count;
            stats.memory_usage_bytes += memory;
            stats.component_counts.insert(type_name.clone(), count);
            stats.component_memory_usage.insert(type_name, memory);
        }

        if stats.active_entities > 0 {
            stats.average_components_per_entity =
                stats.total_components as f64 / stats.active_entities as f64;
        }

        stats.last_update_time = start.elapsed();
        stats.last_calculated = Some(SystemTime::now());

        tracing::debug!(
            active_entities = stats.active_entities,
            total_components = stats.total_components,
            elapsed = ?stats.last_update_time,
            "recomputed entity statistics"
        );
        *snapshot = stats;
    }
}
