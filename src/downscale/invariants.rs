//! Checks deciding whether a group may be downscaled in this pass.
//!
//! Checks run in order and stop at the first denial. A denied group is not
//! an error: it is skipped for this pass and considered again on the next.

use crate::controller::node_group::NodeGroup;
use crate::downscale::state::DownscaleState;

/// Result of an invariant check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantResult {
    /// Whether the downscale may proceed
    pub allowed: bool,
    /// Reason for denial (if not allowed)
    pub reason: Option<String>,
}

impl InvariantResult {
    /// Create an allowed result
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// Create a denied result
    pub fn denied(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// A single check over the pass state and the candidate group.
pub type InvariantCheck = fn(&DownscaleState, &NodeGroup) -> InvariantResult;

/// Deny a master-eligible group when another master removal is already planned.
pub fn one_master_at_a_time(state: &DownscaleState, group: &NodeGroup) -> InvariantResult {
    if group.is_master_eligible() && state.master_removal_in_progress() {
        return InvariantResult::denied("A master node is already being removed");
    }
    InvariantResult::allowed()
}

/// Deny a master-eligible group unless more than one master is running.
pub fn keep_one_running_master(state: &DownscaleState, group: &NodeGroup) -> InvariantResult {
    if group.is_master_eligible() && state.running_masters() <= 1 {
        return InvariantResult::denied("Cannot remove the last running master node");
    }
    InvariantResult::allowed()
}

/// The checks applied when none are configured explicitly.
pub fn default_invariants() -> Vec<InvariantCheck> {
    vec![one_master_at_a_time, keep_one_running_master]
}

/// Run all checks, returning the first denial.
pub fn check_all(
    checks: &[InvariantCheck],
    state: &DownscaleState,
    group: &NodeGroup,
) -> InvariantResult {
    for check in checks {
        let result = check(state, group);
        if !result.allowed {
            return result;
        }
    }
    InvariantResult::allowed()
}
