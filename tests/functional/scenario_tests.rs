//! Single-pass scenarios.

use search_operator::controller::expectations::Expectations;
use search_operator::controller::node_group::NodeGroupKey;
use search_operator::downscale::EventSeverity;
use search_operator::downscale::execute::remove_node_group_resources;
use search_operator::downscale::quorum::UNSAFE_DOWNSCALE_REASON;

use crate::common::fixtures::{NAMESPACE, data, masters, primary, replica};
use crate::fake_cluster::{Call, FakeCluster, run_pass};

fn position(calls: &[Call], wanted: &Call) -> usize {
    calls
        .iter()
        .position(|c| c == wanted)
        .unwrap_or_else(|| panic!("{:?} not found in {:?}", wanted, calls))
}

#[tokio::test]
async fn test_steady_state_does_nothing() {
    let fake = FakeCluster::new()
        .with_group(masters("logs-masters", 3))
        .with_group(data("logs-data", 3));
    let expected = vec![masters("logs-masters", 3), data("logs-data", 3)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, Some(1), &expected).await;

    assert!(results.is_ok());
    assert!(!results.requeue);
    assert_eq!(results.requeue_after(), None);
    assert!(results.leaving_nodes.is_empty());
    assert!(results.events.is_empty());
    assert!(fake.mutations().is_empty());
    // Stale exclusions are cleared even when nothing leaves
    assert_eq!(fake.calls(), vec![Call::ExcludeFromAllocation(vec![])]);
}

#[tokio::test]
async fn test_legacy_two_masters_to_one() {
    let fake = FakeCluster::new()
        .with_group(masters("logs-masters", 2).with_version("6.8.23"))
        .with_group(data("logs-data", 2).with_version("6.8.23"));
    let expected = vec![masters("logs-masters", 1), data("logs-data", 2)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert!(!results.requeue);
    assert_eq!(fake.replicas("logs-masters"), Some(1));
    assert_eq!(fake.minimum_master_nodes(), Some(1));

    let calls = fake.calls();
    let quorum = position(&calls, &Call::SetMinimumMasterNodes(1));
    let voting = position(
        &calls,
        &Call::AddVotingExclusions(vec!["logs-masters-1".to_string()]),
    );
    let update = position(
        &calls,
        &Call::UpdateReplicas {
            group: "logs-masters".to_string(),
            replicas: 1,
        },
    );
    assert!(quorum < voting);
    assert!(voting < update);

    let warning = results
        .events
        .iter()
        .find(|e| e.reason == UNSAFE_DOWNSCALE_REASON)
        .expect("unsafe downscale warning");
    assert_eq!(warning.severity, EventSeverity::Warning);
}

#[tokio::test]
async fn test_voting_protocol_masters_skip_legacy_quorum() {
    let fake = FakeCluster::new().with_group(masters("logs-masters", 2).with_version("7.10.2"));
    let expected = vec![masters("logs-masters", 1)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert_eq!(fake.minimum_master_nodes(), None);
    assert_eq!(fake.voting_exclusions(), vec!["logs-masters-1".to_string()]);
    assert_eq!(fake.replicas("logs-masters"), Some(1));
    assert!(results.events.is_empty());
}

#[tokio::test]
async fn test_zero_budget_holds_every_removal() {
    let fake = FakeCluster::new().with_group(data("logs-data", 5));
    let expected = vec![data("logs-data", 2)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, Some(0), &expected).await;

    assert!(results.is_ok());
    assert!(results.requeue);
    assert_eq!(results.nodes_removed, 0);
    assert!(results.leaving_nodes.is_empty());
    assert!(fake.mutations().is_empty());
    assert_eq!(fake.replicas("logs-data"), Some(5));
}

#[tokio::test]
async fn test_unready_pods_consume_budget() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 4))
        .with_unready_pod("logs-data-0");
    let expected = vec![data("logs-data", 2)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, Some(2), &expected).await;

    assert!(results.is_ok());
    assert!(results.requeue);
    assert_eq!(results.leaving_nodes, vec!["logs-data-3".to_string()]);
    assert_eq!(fake.replicas("logs-data"), Some(3));
}

#[tokio::test]
async fn test_group_removal_with_missing_config() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .with_group(data("logs-old", 2))
        .without_config("logs-old");
    let expected = vec![data("logs-data", 3)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok(), "{:?}", results.error);
    assert!(!results.requeue);
    assert_eq!(results.nodes_removed, 2);
    assert_eq!(
        results.groups_deleted,
        vec![NodeGroupKey::new(NAMESPACE, "logs-old")]
    );
    assert_eq!(fake.replicas("logs-old"), None);
    assert!(!fake.has_service("logs-old"));
    assert!(fake.has_config("logs-data"));

    // The group is gone, so nothing is attempted again
    fake.clear_calls();
    let results = run_pass(&fake, &expectations, None, &expected).await;
    assert!(results.is_ok());
    assert!(fake.mutations().is_empty());
}

#[tokio::test]
async fn test_group_removal_waits_for_unique_data() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .with_group(data("logs-old", 2))
        .with_shards(vec![primary("metrics", "logs-old-0")]);
    let expected = vec![data("logs-data", 3)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert!(results.requeue);
    assert!(results.migrating_data);
    assert!(results.groups_deleted.is_empty());
    assert_eq!(fake.replicas("logs-old"), Some(1));
    assert!(fake.has_service("logs-old"));
    assert!(fake.has_config("logs-old"));

    // Once the shard moved, the rest of the group goes
    fake.relocate_excluded_to("logs-data-0");
    let results = run_pass(&fake, &expectations, None, &expected).await;
    assert!(results.is_ok(), "{:?}", results.error);
    assert_eq!(
        results.groups_deleted,
        vec![NodeGroupKey::new(NAMESPACE, "logs-old")]
    );
    assert_eq!(fake.replicas("logs-old"), None);
}

#[tokio::test]
async fn test_repeated_resource_removal_succeeds() {
    let fake = FakeCluster::new().with_group(data("logs-old", 1));
    let key = NodeGroupKey::new(NAMESPACE, "logs-old");

    remove_node_group_resources(&fake, &key).await.unwrap();
    remove_node_group_resources(&fake, &key).await.unwrap();

    assert_eq!(fake.replicas("logs-old"), None);
    assert!(!fake.has_service("logs-old"));
    assert!(!fake.has_config("logs-old"));
    assert_eq!(
        fake.calls()
            .iter()
            .filter(|c| matches!(c, Call::DeleteStatefulSet(_)))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_highest_ordinal_migrating_blocks_everything() {
    // logs-data-1 is already clear, logs-data-2 still holds the only copy
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .with_shards(vec![primary("metrics", "logs-data-2")]);
    let expected = vec![data("logs-data", 1)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert!(results.requeue);
    assert!(results.migrating_data);
    assert_eq!(fake.replicas("logs-data"), Some(3));
    assert!(fake.mutations().is_empty());
    assert_eq!(
        fake.excluded(),
        vec!["logs-data-2".to_string(), "logs-data-1".to_string()]
    );
    assert_eq!(
        results
            .events
            .iter()
            .filter(|e| e.reason == "MigratingData")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_lower_ordinal_migrating_allows_partial_progress() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .with_shards(vec![primary("metrics", "logs-data-1")]);
    let expected = vec![data("logs-data", 1)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert!(results.requeue);
    assert!(results.migrating_data);
    assert_eq!(fake.replicas("logs-data"), Some(2));
    assert_eq!(results.nodes_removed, 1);
}

#[tokio::test]
async fn test_copy_on_remaining_node_is_not_migrating() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .with_shards(vec![
            primary("metrics", "logs-data-0"),
            replica("metrics", "logs-data-2"),
        ]);
    let expected = vec![data("logs-data", 2)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert!(!results.migrating_data);
    assert!(!results.requeue);
    assert_eq!(fake.replicas("logs-data"), Some(2));
}

#[tokio::test]
async fn test_shard_listing_failure_aborts_pass() {
    let fake = FakeCluster::new()
        .with_group(data("logs-data", 3))
        .failing_shard_listing();
    let expected = vec![data("logs-data", 2)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    let error = results.error.as_ref().expect("pass should fail");
    assert!(error.is_retryable());
    assert_eq!(results.requeue_after(), None);
    assert!(fake.mutations().is_empty());
    // Exclusions were pushed before the failure
    assert_eq!(fake.excluded(), vec!["logs-data-2".to_string()]);
}

#[tokio::test]
async fn test_one_master_group_at_a_time() {
    let fake = FakeCluster::new()
        .with_group(masters("logs-masters-a", 3))
        .with_group(masters("logs-masters-b", 3));
    let expected = vec![masters("logs-masters-a", 2), masters("logs-masters-b", 2)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert_eq!(fake.replicas("logs-masters-a"), Some(2));
    assert_eq!(fake.replicas("logs-masters-b"), Some(3));
    assert_eq!(results.deferred.len(), 1);
    assert_eq!(results.deferred[0].key.name, "logs-masters-b");
}

#[tokio::test]
async fn test_master_group_removal_is_gradual() {
    let fake = FakeCluster::new()
        .with_group(masters("logs-masters", 3))
        .with_group(masters("logs-old-masters", 3));
    let expected = vec![masters("logs-masters", 3)];
    let expectations = Expectations::new();

    let results = run_pass(&fake, &expectations, None, &expected).await;

    assert!(results.is_ok());
    assert!(results.requeue);
    // Deleted only once shrunk member by member to zero
    assert!(results.groups_deleted.is_empty());
    assert!(fake.has_service("logs-old-masters"));
    assert!(fake.has_config("logs-old-masters"));
    assert_eq!(fake.replicas("logs-old-masters"), Some(2));
    assert_eq!(
        fake.voting_exclusions(),
        vec!["logs-old-masters-2".to_string()]
    );
}

#[tokio::test]
async fn test_replica_update_registers_expectation() {
    let fake = FakeCluster::new().with_group(data("logs-data", 3).with_generation(7));
    let expected = vec![data("logs-data", 2)];
    let expectations = Expectations::new();

    run_pass(&fake, &expectations, None, &expected).await;

    let key = NodeGroupKey::new(NAMESPACE, "logs-data");
    assert_eq!(expectations.expected_generation(&key), Some(8));
    // The fake already reflects the update
    assert!(expectations.satisfied(&fake.actual()));
    assert_eq!(expectations.expected_generation(&key), None);
}
