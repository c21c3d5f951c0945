//! Repeated passes until the cluster reaches its wanted topology.

use search_operator::controller::expectations::Expectations;
use search_operator::controller::node_group::{NodeGroup, expected_node_groups};
use search_operator::crd::NodeRoles;

use crate::common::fixtures::{SearchClusterBuilder, data, masters, primary, replica};
use crate::fake_cluster::{Call, FakeCluster, run_pass};

const MAX_PASSES: usize = 20;

/// Run passes until one asks for no requeue. Between passes, data on
/// excluded nodes moves to `spare_node`.
async fn converge(
    fake: &FakeCluster,
    max_unavailable: Option<i32>,
    expected: &[NodeGroup],
    spare_node: &str,
) -> usize {
    let expectations = Expectations::new();
    for pass in 1..=MAX_PASSES {
        assert!(expectations.satisfied(&fake.actual()));
        let results = run_pass(fake, &expectations, max_unavailable, expected).await;
        assert!(results.is_ok(), "pass {} failed: {:?}", pass, results.error);
        if !results.requeue {
            return pass;
        }
        fake.relocate_excluded_to(spare_node);
    }
    panic!("no convergence after {} passes", MAX_PASSES);
}

fn master_updates(calls: &[Call], group: &str) -> Vec<i32> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::UpdateReplicas { group: g, replicas } if g == group => Some(*replicas),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_masters_shrink_one_per_pass() {
    let fake = FakeCluster::new()
        .with_group(masters("logs-masters", 5).with_version("7.10.2"))
        .with_group(data("logs-data", 4).with_version("7.10.2"))
        .with_shards(vec![
            primary("metrics", "logs-data-3"),
            replica("metrics", "logs-data-0"),
            primary("traces", "logs-data-2"),
        ]);
    let expected = vec![masters("logs-masters", 1), data("logs-data", 2)];

    let passes = converge(&fake, None, &expected, "logs-data-0").await;

    assert_eq!(passes, 4);
    assert_eq!(fake.replicas("logs-masters"), Some(1));
    assert_eq!(fake.replicas("logs-data"), Some(2));
    assert_eq!(master_updates(&fake.calls(), "logs-masters"), vec![4, 3, 2, 1]);
    assert_eq!(
        fake.voting_exclusions(),
        vec![
            "logs-masters-4".to_string(),
            "logs-masters-3".to_string(),
            "logs-masters-2".to_string(),
            "logs-masters-1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_exclusions_cleared_after_convergence() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .with_shards(vec![primary("metrics", "logs-data-2")]);
    let expected = vec![data("logs-data", 2)];

    converge(&fake, None, &expected, "logs-data-0").await;
    assert_eq!(fake.replicas("logs-data"), Some(2));

    let expectations = Expectations::new();
    let results = run_pass(&fake, &expectations, None, &expected).await;
    assert!(results.is_ok());
    assert!(fake.excluded().is_empty());
}

#[tokio::test]
async fn test_budget_spreads_removals_over_passes() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 6))
        .with_group(data("logs-old", 2));
    let expected = vec![data("logs-data", 3)];

    let passes = converge(&fake, Some(2), &expected, "logs-data-0").await;

    assert_eq!(passes, 3);
    assert_eq!(fake.replicas("logs-data"), Some(3));
    assert_eq!(fake.replicas("logs-old"), None);
    assert!(!fake.has_config("logs-old"));
    for call in fake.calls() {
        if let Call::ExcludeFromAllocation(nodes) = call {
            assert!(nodes.len() <= 2, "budget exceeded: {:?}", nodes);
        }
    }
}

#[tokio::test]
async fn test_node_set_removed_from_cluster_spec() {
    let cluster = SearchClusterBuilder::new("logs")
        .node_set("masters", 3, NodeRoles::master_only())
        .node_set("hot", 2, NodeRoles::data_only())
        .max_unavailable(1)
        .build();
    let expected = expected_node_groups(&cluster);

    let fake = FakeCluster::new()
        .with_group(masters("logs-masters", 3))
        .with_group(data("logs-hot", 2))
        .with_group(data("logs-warm", 2))
        .with_shards(vec![
            primary("archive", "logs-warm-1"),
            primary("recent", "logs-hot-0"),
        ]);

    let passes = converge(&fake, cluster.spec.max_unavailable(), &expected, "logs-hot-1").await;

    assert_eq!(passes, 3);
    assert_eq!(fake.replicas("logs-warm"), None);
    assert!(!fake.has_service("logs-warm"));
    assert_eq!(fake.replicas("logs-masters"), Some(3));
    assert_eq!(fake.replicas("logs-hot"), Some(2));
}
