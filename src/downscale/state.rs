//! Removal budget for one downscale pass.

use tracing::debug;

use crate::controller::node_group::NodeGroup;
use crate::controller::store::PodInfo;

/// Pass-scoped removal accounting.
///
/// Built fresh at the start of every pass and discarded afterwards. Only the
/// planner mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownscaleState {
    /// Removals still allowed in this pass. `None` means unbounded.
    remaining: Option<i32>,
    /// A master-eligible member is already planned for removal.
    master_removal_in_progress: bool,
    /// Master-eligible pods currently running and ready.
    running_masters: i32,
    /// Removals recorded so far.
    planned_removals: i32,
}

impl DownscaleState {
    /// Create a state with an explicit budget.
    pub fn new(remaining: Option<i32>, running_masters: i32) -> Self {
        Self {
            remaining: remaining.map(|r| r.max(0)),
            master_removal_in_progress: false,
            running_masters,
            planned_removals: 0,
        }
    }

    /// Seed the budget from `maxUnavailable` and the pods currently in the cluster.
    ///
    /// Pods that are not ready already use up part of the budget.
    pub fn from_pods(max_unavailable: Option<i32>, pods: &[PodInfo]) -> Self {
        let current = pods.len() as i32;
        let ready = pods.iter().filter(|p| p.is_running()).count() as i32;
        let running_masters = pods.iter().filter(|p| p.master && p.is_running()).count() as i32;
        let remaining = max_unavailable.map(|max| (max - (current - ready)).max(0));
        debug!(
            ?remaining,
            current, ready, running_masters, "Seeded downscale budget"
        );
        Self::new(remaining, running_masters)
    }

    /// How many of `requested` removals are still allowed.
    pub fn max_nodes_to_remove(&self, requested: i32) -> i32 {
        let requested = requested.max(0);
        match self.remaining {
            Some(remaining) => requested.min(remaining),
            None => requested,
        }
    }

    /// Consume budget for `count` removals from `group`.
    pub fn record_removal(&mut self, group: &NodeGroup, count: i32) {
        let count = count.max(0);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = (*remaining - count).max(0);
        }
        if group.is_master_eligible() && count > 0 {
            self.master_removal_in_progress = true;
        }
        self.planned_removals += count;
    }

    pub fn remaining(&self) -> Option<i32> {
        self.remaining
    }

    pub fn master_removal_in_progress(&self) -> bool {
        self.master_removal_in_progress
    }

    pub fn running_masters(&self) -> i32 {
        self.running_masters
    }

    pub fn planned_removals(&self) -> i32 {
        self.planned_removals
    }
}
