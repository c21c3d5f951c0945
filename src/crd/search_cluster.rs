//! SearchCluster Custom Resource Definition.
//!
//! Declares the desired topology of a search cluster as a list of node sets.
//! Each node set is backed by one StatefulSet whose pods share the same roles.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// SearchCluster is a custom resource describing a search cluster topology.
///
/// Example:
/// ```yaml
/// apiVersion: searchoperator.smoketurner.com/v1alpha1
/// kind: SearchCluster
/// metadata:
///   name: logs
/// spec:
///   version: 7.10.2
///   nodeSets:
///     - name: masters
///       count: 3
///       roles: { master: true, data: false, ingest: false }
///     - name: data
///       count: 4
///       roles: { master: false, data: true, ingest: true }
///   updateStrategy:
///     changeBudget:
///       maxUnavailable: 1
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "searchoperator.smoketurner.com",
    version = "v1alpha1",
    kind = "SearchCluster",
    plural = "searchclusters",
    shortname = "sc",
    status = "SearchClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Nodes", "type":"integer", "jsonPath":".status.availableNodes"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SearchClusterSpec {
    /// Version of the search engine, e.g. "7.10.2".
    pub version: String,

    /// Node sets making up the cluster. Each one maps to a StatefulSet.
    #[serde(default)]
    pub node_sets: Vec<NodeSetSpec>,

    /// Limits on how many nodes may be unavailable during topology changes.
    #[serde(default)]
    pub update_strategy: UpdateStrategySpec,

    /// Additional labels to apply to all managed resources.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A group of homogeneously configured nodes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSetSpec {
    /// Name of the node set, unique within the cluster.
    pub name: String,

    /// Number of nodes in this set.
    #[serde(default)]
    pub count: i32,

    /// Roles assigned to every node of the set.
    #[serde(default)]
    pub roles: NodeRoles,
}

/// Roles a node can hold in the search cluster.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct NodeRoles {
    /// Eligible to be elected master, participates in voting.
    #[serde(default = "default_true")]
    pub master: bool,
    /// Holds shard data.
    #[serde(default = "default_true")]
    pub data: bool,
    /// Runs ingest pipelines.
    #[serde(default = "default_true")]
    pub ingest: bool,
}

impl Default for NodeRoles {
    fn default() -> Self {
        Self {
            master: true,
            data: true,
            ingest: true,
        }
    }
}

impl NodeRoles {
    /// Dedicated master-eligible node.
    pub fn master_only() -> Self {
        Self {
            master: true,
            data: false,
            ingest: false,
        }
    }

    /// Dedicated data node.
    pub fn data_only() -> Self {
        Self {
            master: false,
            data: true,
            ingest: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Update strategy for the cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStrategySpec {
    /// Budget of changes allowed at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_budget: Option<ChangeBudget>,
}

/// Bounds the number of pods that may be unavailable during changes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBudget {
    /// Maximum number of unavailable pods. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,
}

impl SearchClusterSpec {
    /// The configured `maxUnavailable`, if any.
    pub fn max_unavailable(&self) -> Option<i32> {
        self.update_strategy
            .change_budget
            .as_ref()
            .and_then(|b| b.max_unavailable)
    }

    /// Total number of nodes declared across all node sets.
    pub fn total_nodes(&self) -> i32 {
        self.node_sets.iter().map(|n| n.count).sum()
    }
}

/// Status of a SearchCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchClusterStatus {
    /// Current phase.
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Number of pods currently running and ready.
    #[serde(default)]
    pub available_nodes: i32,

    /// Nodes currently excluded from shard allocation ahead of removal.
    ///
    /// Always serialized, so a merge patch with an empty list clears it.
    #[serde(default)]
    pub leaving_nodes: Vec<String>,

    /// The generation last processed by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last error or informational message.
    #[serde(default)]
    pub message: Option<String>,
}

/// ClusterPhase represents the current phase of a SearchCluster.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    /// Not reconciled yet.
    #[default]
    Pending,
    /// Observed topology matches the declared one.
    Ready,
    /// Nodes are being removed.
    Downscaling,
    /// Removal is waiting for shards to move off leaving nodes.
    MigratingData,
    /// Reconciliation failed and will be retried.
    Failed,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Ready => write!(f, "Ready"),
            ClusterPhase::Downscaling => write!(f, "Downscaling"),
            ClusterPhase::MigratingData => write!(f, "MigratingData"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }

    /// Create a "DataMigrating" condition.
    pub fn data_migrating(
        migrating: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("DataMigrating", migrating, reason, message, generation)
    }
}
