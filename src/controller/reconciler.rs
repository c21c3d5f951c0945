//! Reconciliation loop for SearchCluster.
//!
//! Each reconciliation compares the node sets declared by a SearchCluster
//! with the StatefulSets observed in the cache and runs a downscale pass when
//! some group has more members than wanted. Creating and growing groups is
//! left to other components.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use kube::{
    Api, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::{
    client::SearchClient,
    controller::{
        context::Context,
        error::Error,
        node_group::{NodeGroup, NodeGroupKey, expected_node_groups, find_by_name},
        status::{StatusInput, build_status},
        store::{KubeNodeGroupStore, NodeGroupStore, actual_node_groups},
    },
    crd::{ClusterPhase, SearchCluster, SearchClusterStatus},
    downscale::{
        DownscaleContext, DownscaleResults, REQUEUE_DELAY, default_invariants, handle_downscale,
    },
    resources::common::http_service_name,
};

/// Requeue interval once the cluster has converged
const CONVERGED_REQUEUE: Duration = Duration::from_secs(60);

/// Reconcile a SearchCluster
///
/// This is the main reconciliation function called by the controller.
pub async fn reconcile(obj: Arc<SearchCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling SearchCluster");

    // Owned resources are garbage collected through owner references
    if obj.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let api: Api<SearchCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = obj.metadata.generation;

    if let Err(e) = validate_spec(&obj) {
        error!(name = %name, error = %e, "Validation failed");
        ctx.publish_warning_event(&obj, "ValidationFailed", "Validating", Some(e.to_string()))
            .await;
        let status = validation_failed_status(obj.status.as_ref(), &e, generation);
        update_status(&api, &name, &status).await?;
        return Err(e);
    }

    let expected = expected_node_groups(&obj);
    let actual = actual_node_groups(&ctx.statefulsets, &namespace, &name);

    // Our own updates may not be in the cache yet
    if !ctx.expectations.satisfied(&actual) {
        debug!(name = %name, "StatefulSet cache not up to date, requeueing");
        return Ok(Action::requeue(REQUEUE_DELAY));
    }

    let store = KubeNodeGroupStore::new(ctx.client.clone(), &namespace, &name);
    let previous_leaving = obj
        .status
        .as_ref()
        .map(|s| s.leaving_nodes.as_slice())
        .unwrap_or_default();

    let results = if needs_downscale_pass(&expected, &actual, previous_leaving) {
        let masters: Vec<NodeGroup> = actual
            .iter()
            .filter(|g| g.is_master_eligible())
            .cloned()
            .collect();
        let legacy_discovery = store.any_member_on_legacy_protocol(&masters).await?;
        let search = SearchClient::new(
            ctx.config
                .search_client_config(&namespace, &http_service_name(&name)),
        )?
        .with_legacy_discovery(legacy_discovery);
        let invariants = default_invariants();
        let cluster = NodeGroupKey::new(namespace.clone(), name.clone());
        let downscale_ctx = DownscaleContext {
            cluster: &cluster,
            store: &store,
            shards: &search,
            allocation: &search,
            legacy_quorum: &search,
            voting: &search,
            expectations: &ctx.expectations,
            max_unavailable: obj.spec.max_unavailable(),
            invariants: &invariants,
        };
        handle_downscale(&downscale_ctx, &expected, &actual).await
    } else {
        DownscaleResults::default()
    };

    ctx.publish_recorded_events(&obj, &results.events).await;
    for deleted in &results.groups_deleted {
        ctx.publish_normal_event(
            &obj,
            "NodeGroupDeleted",
            "Downscaling",
            Some(format!("Deleted node group {}", deleted.name)),
        )
        .await;
    }

    let available_nodes = match store.cluster_pods().await {
        Ok(pods) => pods.iter().filter(|p| p.is_running()).count() as i32,
        Err(e) => {
            warn!(name = %name, error = %e, "Failed to list cluster pods");
            obj.status.as_ref().map(|s| s.available_nodes).unwrap_or(0)
        }
    };

    let phase = next_phase(&results, &expected, &actual);
    if phase != current_phase(&obj) {
        info!(name = %name, from = %current_phase(&obj), to = %phase, "Phase transition");
    }
    let status = build_status(
        obj.status.as_ref(),
        StatusInput {
            phase,
            available_nodes,
            leaving_nodes: leaving_nodes_to_record(previous_leaving, &results),
            message: results.error.as_ref().map(|e| e.to_string()),
            generation,
        },
    );
    update_status(&api, &name, &status).await?;

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_downscale(
            &namespace,
            &name,
            u64::try_from(results.nodes_removed).unwrap_or(0),
            results.groups_deleted.len() as u64,
            results.migrating_data,
        );
        health_state.metrics.set_cluster_nodes(
            &namespace,
            &name,
            i64::from(obj.spec.total_nodes()),
            i64::from(available_nodes),
        );
    }

    let requeue_after = results.requeue_after();
    if let Some(e) = results.error {
        ctx.publish_warning_event(&obj, "DownscaleFailed", "Downscaling", Some(e.to_string()))
            .await;
        return Err(e);
    }

    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
        let now = u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or(0);
        health_state.last_reconcile.store(now, Ordering::Relaxed);
    }

    let requeue_duration = match phase {
        ClusterPhase::Ready => CONVERGED_REQUEUE,
        ClusterPhase::Downscaling | ClusterPhase::MigratingData => REQUEUE_DELAY,
        ClusterPhase::Pending => Duration::from_secs(30),
        ClusterPhase::Failed => Duration::from_secs(300),
    };
    Ok(Action::requeue(requeue_after.unwrap_or(requeue_duration)))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<SearchCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}

fn current_phase(obj: &SearchCluster) -> ClusterPhase {
    obj.status
        .as_ref()
        .map(|s| s.phase)
        .unwrap_or(ClusterPhase::Pending)
}

/// Validate the resource spec
pub fn validate_spec(obj: &SearchCluster) -> Result<(), Error> {
    let mut names = HashSet::new();
    for node_set in &obj.spec.node_sets {
        if node_set.name.is_empty() {
            return Err(Error::Validation("node set name must not be empty".to_string()));
        }
        if !names.insert(node_set.name.as_str()) {
            return Err(Error::Validation(format!(
                "duplicate node set name {:?}",
                node_set.name
            )));
        }
        if node_set.count < 0 {
            return Err(Error::Validation(format!(
                "node set {:?} count must not be negative",
                node_set.name
            )));
        }
    }
    if obj.spec.max_unavailable().is_some_and(|m| m < 0) {
        return Err(Error::Validation(
            "changeBudget.maxUnavailable must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Failed status after validation. Leaving nodes stay recorded so that a
/// later valid pass still clears their exclusions.
fn validation_failed_status(
    previous: Option<&SearchClusterStatus>,
    error: &Error,
    generation: Option<i64>,
) -> SearchClusterStatus {
    build_status(
        previous,
        StatusInput {
            phase: ClusterPhase::Failed,
            message: Some(error.to_string()),
            generation,
            available_nodes: previous.map_or(0, |s| s.available_nodes),
            leaving_nodes: previous.map(|s| s.leaving_nodes.clone()).unwrap_or_default(),
        },
    )
}

/// Nodes to keep in status as excluded from allocation.
///
/// Unless this pass wrote the exclusion setting, whatever was excluded
/// before still is.
pub fn leaving_nodes_to_record(previous: &[String], results: &DownscaleResults) -> Vec<String> {
    if results.exclusions_updated {
        results.leaving_nodes.clone()
    } else {
        previous.to_vec()
    }
}

/// Whether some group shrinks, or exclusions from an earlier pass need clearing.
pub fn needs_downscale_pass(
    expected: &[NodeGroup],
    actual: &[NodeGroup],
    previous_leaving: &[String],
) -> bool {
    !previous_leaving.is_empty()
        || actual.iter().any(|group| {
            let wanted = find_by_name(expected, group.name()).map_or(0, |g| g.replicas);
            wanted < group.replicas
        })
}

/// Whether every expected group exists with its wanted size and nothing else does.
fn is_converged(expected: &[NodeGroup], actual: &[NodeGroup]) -> bool {
    expected.len() == actual.len()
        && expected.iter().all(|e| {
            find_by_name(actual, e.name()).is_some_and(|a| a.replicas == e.replicas)
        })
}

/// Phase to report after a pass.
pub fn next_phase(
    results: &DownscaleResults,
    expected: &[NodeGroup],
    actual: &[NodeGroup],
) -> ClusterPhase {
    if results.error.is_some() {
        ClusterPhase::Failed
    } else if results.migrating_data {
        ClusterPhase::MigratingData
    } else if results.requeue || results.nodes_removed > 0 {
        ClusterPhase::Downscaling
    } else if is_converged(expected, actual) {
        ClusterPhase::Ready
    } else {
        ClusterPhase::Pending
    }
}

/// Update the status of a SearchCluster
async fn update_status(
    api: &Api<SearchCluster>,
    name: &str,
    status: &SearchClusterStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "status": status
    });

    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(())
}
