// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for search-operator.
//!
//! Uses proptest to generate random topologies and verify the safety
//! properties of downscale planning and the migration gate.

use std::collections::BTreeSet;

use async_trait::async_trait;
use proptest::prelude::*;

use search_operator::client::{SearchError, Shard, ShardLister, ShardType};
use search_operator::controller::node_group::{NodeGroup, leaving_pod_names};
use search_operator::crd::NodeRoles;
use search_operator::downscale::migration::calculate_performable;
use search_operator::downscale::{DownscaleState, calculate_downscales, default_invariants};
use search_operator::resources::common::pod_name;

/// Shard lister returning a fixed snapshot.
struct StaticShards(Vec<Shard>);

#[async_trait]
impl ShardLister for StaticShards {
    async fn get_shards(&self) -> Result<Vec<Shard>, SearchError> {
        Ok(self.0.clone())
    }
}

/// Strategy for generating node roles.
fn any_roles() -> impl Strategy<Value = NodeRoles> {
    prop_oneof![
        Just(NodeRoles::master_only()),
        Just(NodeRoles::data_only()),
        Just(NodeRoles::default()),
    ]
}

/// Strategy for generating (actual, expected) replica pairs of up to 4 groups.
fn topology() -> impl Strategy<Value = Vec<(i32, i32, NodeRoles)>> {
    prop::collection::vec((0..=8i32, 0..=8i32, any_roles()), 1..=4)
}

fn groups(topology: &[(i32, i32, NodeRoles)]) -> (Vec<NodeGroup>, Vec<NodeGroup>) {
    let mut actual = Vec::new();
    let mut expected = Vec::new();
    for (i, (actual_replicas, expected_replicas, roles)) in topology.iter().enumerate() {
        let name = format!("logs-{}", i);
        actual.push(NodeGroup::new("search", &name, *actual_replicas).with_roles(roles.clone()));
        expected
            .push(NodeGroup::new("search", &name, *expected_replicas).with_roles(roles.clone()));
    }
    (actual, expected)
}

fn running_masters(groups: &[NodeGroup]) -> i32 {
    groups
        .iter()
        .filter(|g| g.is_master_eligible())
        .map(|g| g.replicas)
        .sum()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    /// Leaving nodes never exceed the wanted reduction and are always the
    /// highest ordinals of the group.
    #[test]
    fn leaving_nodes_are_highest_ordinals(
        topology in topology(),
        budget in prop::option::of(0..=6i32),
    ) {
        let (actual, expected) = groups(&topology);
        let mut state = DownscaleState::new(budget, running_masters(&actual));
        let plan = calculate_downscales(&mut state, &default_invariants(), &expected, &actual);

        for op in &plan.operations {
            let leaving = op.leaving_nodes();
            prop_assert!(leaving.len() as i32 <= op.initial_replicas - op.final_replicas);
            let k = op.initial_replicas - op.target_replicas;
            let highest: Vec<String> = (op.initial_replicas - k..op.initial_replicas)
                .rev()
                .map(|ordinal| pod_name(op.group.name(), ordinal))
                .collect();
            prop_assert_eq!(leaving, highest);
        }
    }

    /// The budget is never exceeded and master groups lose at most one member.
    #[test]
    fn plan_respects_budget_and_master_clamp(
        topology in topology(),
        budget in prop::option::of(0..=6i32),
    ) {
        let (actual, expected) = groups(&topology);
        let mut state = DownscaleState::new(budget, running_masters(&actual));
        let plan = calculate_downscales(&mut state, &default_invariants(), &expected, &actual);

        let removed: i32 = plan
            .operations
            .iter()
            .map(|op| op.initial_replicas - op.target_replicas)
            .sum();
        if let Some(budget) = budget {
            prop_assert!(removed <= budget);
        }
        prop_assert_eq!(removed as usize, plan.leaving_nodes.len());

        let master_removals: i32 = plan
            .operations
            .iter()
            .filter(|op| op.group.is_master_eligible())
            .map(|op| op.initial_replicas - op.target_replicas)
            .sum();
        prop_assert!(master_removals <= 1);

        for op in &plan.operations {
            prop_assert!(op.final_replicas <= op.target_replicas);
            prop_assert!(op.target_replicas <= op.initial_replicas);
        }
    }

    /// Re-running the gate against the same shards gives the same answer,
    /// and it never goes past the planned target.
    #[test]
    fn performable_is_idempotent(
        initial in 1..=8i32,
        removed in 1..=8i32,
        holders in prop::collection::btree_set(0..8i32, 0..=4),
        replicated in prop::collection::btree_set(0..8i32, 0..=4),
    ) {
        let target = (initial - removed).max(0);
        let group = NodeGroup::new("search", "logs-data", initial)
            .with_roles(NodeRoles::data_only());
        let op = search_operator::downscale::DownscaleOperation {
            group,
            initial_replicas: initial,
            target_replicas: target,
            final_replicas: target,
        };
        let shards = shards_on(&holders, &replicated);
        let lister = StaticShards(shards);
        let leaving = leaving_pod_names("logs-data", target, initial);

        let rt = runtime();
        let first = rt.block_on(calculate_performable(&lister, &op, &leaving)).unwrap();
        let second = rt.block_on(calculate_performable(&lister, &op, &leaving)).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert!(first.operation.target_replicas >= target);
        prop_assert!(first.operation.target_replicas <= initial);
    }

    /// A migrating highest-ordinal leaving node blocks the whole operation.
    #[test]
    fn highest_migrating_node_blocks_progress(
        initial in 2..=8i32,
        removed in 1..=8i32,
    ) {
        let target = (initial - removed).max(0);
        let op = search_operator::downscale::DownscaleOperation {
            group: NodeGroup::new("search", "logs-data", initial),
            initial_replicas: initial,
            target_replicas: target,
            final_replicas: target,
        };
        let highest = pod_name("logs-data", initial - 1);
        let lister = StaticShards(vec![Shard::started("logs", "0", ShardType::Primary, &highest)]);
        let leaving = leaving_pod_names("logs-data", target, initial);

        let performable = runtime()
            .block_on(calculate_performable(&lister, &op, &leaving))
            .unwrap();

        prop_assert!(performable.migrating_data);
        prop_assert_eq!(performable.operation.target_replicas, initial);
    }
}

/// One primary per holder ordinal; ordinals in `replicated` also get a
/// started replica of the same shard on an external node.
fn shards_on(holders: &BTreeSet<i32>, replicated: &BTreeSet<i32>) -> Vec<Shard> {
    let mut shards = Vec::new();
    for ordinal in holders {
        let index = format!("index-{}", ordinal);
        shards.push(Shard::started(
            &index,
            "0",
            ShardType::Primary,
            &pod_name("logs-data", *ordinal),
        ));
        if replicated.contains(ordinal) {
            shards.push(Shard::started(&index, "0", ShardType::Replica, "logs-other-0"));
        }
    }
    shards
}
