//! Downscale planning.
//!
//! Compares expected and actual node groups and decides how many members of
//! each group may be removed in this pass. Planning does no I/O.

use tracing::{debug, info};

use crate::controller::node_group::{NodeGroup, NodeGroupKey, find_by_name, leaving_pod_names};
use crate::downscale::invariants::{InvariantCheck, check_all};
use crate::downscale::state::DownscaleState;

/// A planned downscale of one group.
///
/// `final_replicas <= target_replicas <= initial_replicas`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownscaleOperation {
    /// The group, as observed at the start of the pass.
    pub group: NodeGroup,
    /// Replicas at the start of the pass.
    pub initial_replicas: i32,
    /// Replicas this pass attempts to reach.
    pub target_replicas: i32,
    /// Replicas eventually wanted. 0 means the group goes away.
    pub final_replicas: i32,
}

impl DownscaleOperation {
    pub fn is_removal(&self) -> bool {
        self.final_replicas == 0 && self.initial_replicas > 0
    }

    pub fn is_replica_decrease(&self) -> bool {
        self.target_replicas < self.initial_replicas
    }

    /// Members leaving in this step, highest ordinal first.
    pub fn leaving_nodes(&self) -> Vec<String> {
        leaving_pod_names(
            self.group.name(),
            self.target_replicas,
            self.initial_replicas,
        )
    }

    /// Same operation with another intermediate target.
    pub fn with_target(&self, target_replicas: i32) -> Self {
        Self {
            target_replicas,
            ..self.clone()
        }
    }
}

/// A group left out of this pass and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredGroup {
    pub key: NodeGroupKey,
    pub reason: String,
}

/// Output of the planner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownscalePlan {
    pub operations: Vec<DownscaleOperation>,
    /// Leaving nodes of every operation.
    pub leaving_nodes: Vec<String>,
    /// Groups an invariant check kept from shrinking in this pass.
    pub deferred: Vec<DeferredGroup>,
}

impl DownscalePlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Plan the downscales of this pass.
///
/// For every actual group the wanted replica count is the matching expected
/// group's, or 0 when there is none. Master-eligible groups lose at most one
/// member per pass, including full removals. The removal budget in `state`
/// is consumed as operations are accepted.
pub fn calculate_downscales(
    state: &mut DownscaleState,
    invariants: &[InvariantCheck],
    expected: &[NodeGroup],
    actual: &[NodeGroup],
) -> DownscalePlan {
    let mut plan = DownscalePlan::default();

    for group in actual {
        let actual_replicas = group.replicas;
        let expected_replicas = find_by_name(expected, group.name())
            .map(|g| g.replicas)
            .unwrap_or(0);

        if expected_replicas >= actual_replicas {
            continue;
        }

        let mut to_delete = actual_replicas - expected_replicas;
        if group.is_master_eligible() && to_delete > 0 {
            to_delete = 1;
        }
        to_delete = state.max_nodes_to_remove(to_delete);

        let check = check_all(invariants, state, group);
        if !check.allowed {
            let reason = check.reason.unwrap_or_default();
            info!(group = %group.key, reason = %reason, "Cannot downscale node group");
            plan.deferred.push(DeferredGroup {
                key: group.key.clone(),
                reason,
            });
            continue;
        }

        if to_delete == 0 {
            debug!(
                group = %group.key,
                from = actual_replicas,
                to = expected_replicas,
                "Could not downscale: no removal budget left"
            );
        }

        let operation = DownscaleOperation {
            group: group.clone(),
            initial_replicas: actual_replicas,
            target_replicas: actual_replicas - to_delete,
            final_replicas: expected_replicas,
        };
        plan.leaving_nodes.extend(operation.leaving_nodes());
        plan.operations.push(operation);
        state.record_removal(group, to_delete);
    }

    plan
}
