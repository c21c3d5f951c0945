//! Generation expectations for StatefulSets we updated.
//!
//! After updating a StatefulSet the controller's cache may still serve the
//! previous version for a while. Acting on that stale view could repeat a
//! downscale step, so every update records the generation it produced and
//! reconciliation waits until the cache has caught up.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::controller::node_group::{NodeGroup, NodeGroupKey};

/// Process-wide record of expected StatefulSet generations.
///
/// Keyed by namespace and name, so clusters in different namespaces never
/// share entries.
#[derive(Debug, Default)]
pub struct Expectations {
    generations: RwLock<HashMap<NodeGroupKey, i64>>,
}

impl Expectations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` is expected to be observed at `generation` or later.
    pub fn expect_generation(&self, key: &NodeGroupKey, generation: i64) {
        let mut generations = match self.generations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = generations.entry(key.clone()).or_insert(generation);
        if generation > *entry {
            *entry = generation;
        }
        debug!(group = %key, generation, "Recorded generation expectation");
    }

    /// Expected generation for `key`, if any.
    pub fn expected_generation(&self, key: &NodeGroupKey) -> Option<i64> {
        let generations = match self.generations.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        generations.get(key).copied()
    }

    /// Whether every observed group is at or past its expected generation.
    ///
    /// Entries satisfied by the observation are dropped. Entries for groups
    /// that are no longer observed are left alone: the StatefulSet may just
    /// be missing from a stale cache.
    pub fn satisfied(&self, observed: &[NodeGroup]) -> bool {
        let mut generations = match self.generations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut satisfied = true;
        for group in observed {
            let Some(expected) = generations.get(&group.key).copied() else {
                continue;
            };
            if group.generation.unwrap_or(0) >= expected {
                generations.remove(&group.key);
            } else {
                debug!(
                    group = %group.key,
                    expected,
                    observed = ?group.generation,
                    "StatefulSet cache is stale"
                );
                satisfied = false;
            }
        }
        satisfied
    }

    /// Forget a group, e.g. after it was deleted.
    pub fn forget(&self, key: &NodeGroupKey) {
        let mut generations = match self.generations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        generations.remove(key);
    }
}
