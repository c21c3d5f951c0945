//! Data migration gate.
//!
//! Leaving nodes are excluded from shard allocation, and the cluster moves
//! their shards elsewhere. A node may only be removed once every shard copy
//! it holds has a started copy on a node that stays.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::client::{Shard, ShardLister, ShardState};
use crate::controller::error::Result;
use crate::downscale::plan::DownscaleOperation;

/// Whether `node` still holds data that does not exist elsewhere.
///
/// A copy counts as safe only when another copy of the same shard is
/// `STARTED` on a node that is neither `node` nor another leaving node, so a
/// shard moving between two leaving nodes is still unresolved.
pub fn is_migrating_data(shards: &[Shard], node: &str, leaving_nodes: &[String]) -> bool {
    let leaving: HashSet<&str> = leaving_nodes.iter().map(String::as_str).collect();

    shards.iter().filter(|s| s.is_on(node)).any(|held| {
        !shards.iter().any(|other| {
            other.same_shard(held)
                && other.state == ShardState::Started
                && other
                    .node
                    .as_deref()
                    .is_some_and(|n| n != node && !leaving.contains(n))
        })
    })
}

/// Outcome of the migration gate for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformableDownscale {
    /// The operation reduced to what can be done now.
    pub operation: DownscaleOperation,
    /// The walk stopped on a node still migrating data.
    pub migrating_data: bool,
    /// The node it stopped on.
    pub blocked_on: Option<String>,
}

/// Largest part of `operation` that can be performed now.
///
/// Leaving nodes are checked highest ordinal first. The walk stops at the
/// first node still holding data: lower ordinals cannot leave before it.
/// Errors from the shard lister abort the computation.
pub async fn calculate_performable(
    shard_lister: &dyn ShardLister,
    operation: &DownscaleOperation,
    all_leaving_nodes: &[String],
) -> Result<PerformableDownscale> {
    let mut performable = operation.with_target(operation.initial_replicas);
    let leaving = operation.leaving_nodes();
    if leaving.is_empty() {
        return Ok(PerformableDownscale {
            operation: performable,
            migrating_data: false,
            blocked_on: None,
        });
    }

    let shards = shard_lister.get_shards().await?;

    for node in leaving {
        if is_migrating_data(&shards, &node, all_leaving_nodes) {
            info!(
                group = %operation.group.key,
                node = %node,
                "Data migration not over yet, skipping node deletion"
            );
            return Ok(PerformableDownscale {
                operation: performable,
                migrating_data: true,
                blocked_on: Some(node),
            });
        }
        debug!(group = %operation.group.key, node = %node, "Node evacuated");
        performable.target_replicas -= 1;
    }

    Ok(PerformableDownscale {
        operation: performable,
        migrating_data: false,
        blocked_on: None,
    })
}
