//! Safe downscale of search cluster node groups.
//!
//! A pass compares expected and actual node groups and moves each shrinking
//! group one safe step closer to its wanted size:
//!
//! 1. `state` seeds the removal budget of the pass.
//! 2. `plan` decides, without I/O, how many members each group may lose.
//! 3. Leaving nodes are excluded from shard allocation.
//! 4. `migration` reduces every operation to the members already evacuated.
//! 5. `quorum` updates discovery settings before masters leave.
//! 6. `execute` shrinks or deletes the group.
//!
//! Passes are repeated until the cluster converges. Every decision is
//! derived again from observed state, so an interrupted pass is harmless.

pub mod execute;
pub mod invariants;
pub mod migration;
pub mod plan;
pub mod quorum;
pub mod state;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{AllocationExclusions, LegacyQuorum, ShardLister, VotingExclusions};
use crate::controller::error::{Error, Result};
use crate::controller::expectations::Expectations;
use crate::controller::node_group::{NodeGroup, NodeGroupKey};
use crate::controller::store::NodeGroupStore;

pub use invariants::{InvariantCheck, InvariantResult, default_invariants};
pub use plan::{DeferredGroup, DownscaleOperation, DownscalePlan, calculate_downscales};
pub use state::DownscaleState;

/// Delay before the next pass when a downscale is still in progress.
pub const REQUEUE_DELAY: Duration = Duration::from_secs(10);

/// Collaborators and settings of one downscale pass.
pub struct DownscaleContext<'a> {
    /// Cluster identity, for logs.
    pub cluster: &'a NodeGroupKey,
    pub store: &'a dyn NodeGroupStore,
    pub shards: &'a dyn ShardLister,
    pub allocation: &'a dyn AllocationExclusions,
    pub legacy_quorum: &'a dyn LegacyQuorum,
    pub voting: &'a dyn VotingExclusions,
    pub expectations: &'a Expectations,
    /// `maxUnavailable` of the cluster. Unbounded when `None`.
    pub max_unavailable: Option<i32>,
    /// Checks a group must pass to be downscaled.
    pub invariants: &'a [InvariantCheck],
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// An event recorded during a pass, published by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub severity: EventSeverity,
    pub reason: String,
    pub action: String,
    pub note: String,
}

/// Outcome of a downscale pass.
#[derive(Debug, Default)]
pub struct DownscaleResults {
    /// First error met. Remaining operations were not attempted.
    pub error: Option<Error>,
    /// Another pass is needed.
    pub requeue: bool,
    /// At least one leaving node still holds data.
    pub migrating_data: bool,
    /// Nodes excluded from shard allocation in this pass.
    pub leaving_nodes: Vec<String>,
    /// The exclusion setting was written with `leaving_nodes`.
    pub exclusions_updated: bool,
    /// Groups an invariant kept from shrinking.
    pub deferred: Vec<DeferredGroup>,
    /// Members removed in this pass.
    pub nodes_removed: i32,
    /// Groups deleted in this pass.
    pub groups_deleted: Vec<NodeGroupKey>,
    /// Events to publish on the cluster resource.
    pub events: Vec<RecordedEvent>,
}

impl DownscaleResults {
    /// Requeue delay, if another pass is needed and nothing failed.
    pub fn requeue_after(&self) -> Option<Duration> {
        (self.requeue && self.error.is_none()).then_some(REQUEUE_DELAY)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn record_warning(&mut self, reason: &str, action: &str, note: &str) {
        self.record_event(EventSeverity::Warning, reason, action, note);
    }

    pub fn record_normal(&mut self, reason: &str, action: &str, note: &str) {
        self.record_event(EventSeverity::Normal, reason, action, note);
    }

    fn record_event(&mut self, severity: EventSeverity, reason: &str, action: &str, note: &str) {
        self.events.push(RecordedEvent {
            severity,
            reason: reason.to_string(),
            action: action.to_string(),
            note: note.to_string(),
        });
    }

    /// Note that a group is waiting on data migration.
    pub fn mark_migrating(&mut self, group: &NodeGroupKey, node: Option<&str>) {
        if !self.migrating_data {
            let note = match node {
                Some(node) => format!("Waiting for data to migrate away from {} ({})", node, group),
                None => format!("Waiting for data migration in {}", group),
            };
            self.record_normal("MigratingData", "Downscaling", &note);
        }
        self.migrating_data = true;
    }

    pub fn record_removed(&mut self, group: &NodeGroupKey, count: i32, deleted: bool) {
        self.nodes_removed += count;
        if deleted {
            self.groups_deleted.push(group.clone());
        }
    }
}

/// Run one downscale pass.
///
/// Stops at the first error, which is returned in the results. Operations
/// applied before it are kept.
pub async fn handle_downscale(
    ctx: &DownscaleContext<'_>,
    expected: &[NodeGroup],
    actual: &[NodeGroup],
) -> DownscaleResults {
    let mut results = DownscaleResults::default();
    if let Err(e) = run_downscale(ctx, expected, actual, &mut results).await {
        warn!(cluster = %ctx.cluster, error = %e, "Downscale failed");
        results.error = Some(e);
    }
    results
}

async fn run_downscale(
    ctx: &DownscaleContext<'_>,
    expected: &[NodeGroup],
    actual: &[NodeGroup],
    results: &mut DownscaleResults,
) -> Result<()> {
    let pods = ctx.store.cluster_pods().await?;
    let mut state = DownscaleState::from_pods(ctx.max_unavailable, &pods);

    let plan = calculate_downscales(&mut state, ctx.invariants, expected, actual);
    results.deferred = plan.deferred.clone();
    results.leaving_nodes = plan.leaving_nodes.clone();

    // Also clears exclusions left by an earlier pass
    ctx.allocation
        .exclude_from_shard_allocation(&plan.leaving_nodes)
        .await?;
    results.exclusions_updated = true;

    if plan.is_empty() {
        debug!(cluster = %ctx.cluster, "No downscale needed");
        return Ok(());
    }
    info!(
        cluster = %ctx.cluster,
        operations = plan.operations.len(),
        leaving = ?plan.leaving_nodes,
        "Downscaling node groups"
    );

    for operation in &plan.operations {
        let requeue =
            execute::attempt_downscale(ctx, operation, &plan.leaving_nodes, actual, results)
                .await?;
        results.requeue |= requeue;
    }
    Ok(())
}
