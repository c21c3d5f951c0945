//! Applies downscale operations to the node groups.

use tracing::{debug, info};

use crate::controller::error::Result;
use crate::controller::node_group::{NodeGroup, NodeGroupKey};
use crate::controller::store::NodeGroupStore;
use crate::downscale::migration::calculate_performable;
use crate::downscale::plan::DownscaleOperation;
use crate::downscale::quorum::update_quorum_for_downscale;
use crate::downscale::{DownscaleContext, DownscaleResults};

/// Run the migration gate, quorum update and mutation for one operation.
///
/// Returns whether another pass is needed for this group. A group is deleted
/// only once every member is evacuated; until then it shrinks like any other.
pub async fn attempt_downscale(
    ctx: &DownscaleContext<'_>,
    operation: &DownscaleOperation,
    all_leaving_nodes: &[String],
    actual: &[NodeGroup],
    results: &mut DownscaleResults,
) -> Result<bool> {
    if !operation.is_replica_decrease() {
        // Nothing allowed this pass, either budget or an invariant held it back
        let pending = operation.final_replicas < operation.initial_replicas;
        if pending {
            debug!(group = %operation.group.key, "Downscale pending, no removal allowed in this pass");
        }
        return Ok(pending);
    }

    let gate = calculate_performable(ctx.shards, operation, all_leaving_nodes).await?;
    if gate.migrating_data {
        results.mark_migrating(&operation.group.key, gate.blocked_on.as_deref());
    }
    let performable = gate.operation;
    if !performable.is_replica_decrease() {
        // Waiting for data migration
        return Ok(true);
    }

    update_quorum_for_downscale(ctx, &performable, actual, results).await?;

    let removed = performable.initial_replicas - performable.target_replicas;
    if operation.is_removal() && performable.target_replicas == 0 {
        remove_node_group_resources(ctx.store, &operation.group.key).await?;
        ctx.expectations.forget(&operation.group.key);
        results.record_removed(&operation.group.key, removed, true);
        return Ok(false);
    }

    do_downscale(ctx, &performable).await?;
    results.record_removed(&operation.group.key, removed, false);
    Ok(performable.target_replicas != operation.final_replicas)
}

/// Update the replica count and remember the generation it produced.
async fn do_downscale(ctx: &DownscaleContext<'_>, performable: &DownscaleOperation) -> Result<()> {
    info!(
        group = %performable.group.key,
        from = performable.initial_replicas,
        to = performable.target_replicas,
        "Scaling replicas down"
    );
    let generation = ctx
        .store
        .update_replicas(&performable.group, performable.target_replicas)
        .await?;
    ctx.expectations
        .expect_generation(&performable.group.key, generation);
    Ok(())
}

/// Delete a group's headless Service, ConfigMap and StatefulSet.
///
/// Objects that are already gone count as deleted, so repeating this is safe.
pub async fn remove_node_group_resources(
    store: &dyn NodeGroupStore,
    key: &NodeGroupKey,
) -> Result<()> {
    info!(group = %key, "Deleting node group");
    ignore_not_found(store.delete_headless_service(key).await)?;
    ignore_not_found(store.delete_config(key).await)?;
    ignore_not_found(store.delete_statefulset(key).await)?;
    Ok(())
}

fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!(error = %e, "Already deleted");
            Ok(())
        }
        other => other,
    }
}
