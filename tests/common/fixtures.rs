//! Test fixtures and builder patterns for SearchCluster and node groups.

#![allow(dead_code)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use search_operator::client::{Shard, ShardState, ShardType};
use search_operator::controller::node_group::NodeGroup;
use search_operator::crd::{
    ChangeBudget, NodeRoles, NodeSetSpec, SearchCluster, SearchClusterSpec, UpdateStrategySpec,
};

pub const NAMESPACE: &str = "search";

/// Builder for creating SearchCluster test fixtures.
///
/// # Example
/// ```
/// let cluster = SearchClusterBuilder::new("logs")
///     .node_set("masters", 3, NodeRoles::master_only())
///     .node_set("data", 5, NodeRoles::data_only())
///     .max_unavailable(1)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct SearchClusterBuilder {
    name: String,
    namespace: String,
    version: String,
    node_sets: Vec<NodeSetSpec>,
    max_unavailable: Option<i32>,
    labels: BTreeMap<String, String>,
    generation: Option<i64>,
}

impl SearchClusterBuilder {
    /// Create a new builder with the given cluster name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: NAMESPACE.to_string(),
            version: "7.10.2".to_string(),
            node_sets: Vec::new(),
            max_unavailable: None,
            labels: BTreeMap::new(),
            generation: Some(1),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn node_set(mut self, name: &str, count: i32, roles: NodeRoles) -> Self {
        self.node_sets.push(NodeSetSpec {
            name: name.to_string(),
            count,
            roles,
        });
        self
    }

    pub fn max_unavailable(mut self, max_unavailable: i32) -> Self {
        self.max_unavailable = Some(max_unavailable);
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> SearchCluster {
        let update_strategy = UpdateStrategySpec {
            change_budget: self.max_unavailable.map(|m| ChangeBudget {
                max_unavailable: Some(m),
            }),
        };
        SearchCluster {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                generation: self.generation,
                ..Default::default()
            },
            spec: SearchClusterSpec {
                version: self.version,
                node_sets: self.node_sets,
                update_strategy,
                labels: self.labels,
            },
            status: None,
        }
    }
}

/// A master-only node group.
pub fn masters(name: &str, replicas: i32) -> NodeGroup {
    NodeGroup::new(NAMESPACE, name, replicas).with_roles(NodeRoles::master_only())
}

/// A data-only node group.
pub fn data(name: &str, replicas: i32) -> NodeGroup {
    NodeGroup::new(NAMESPACE, name, replicas).with_roles(NodeRoles::data_only())
}

/// A started primary copy of `index` shard 0 on `node`.
pub fn primary(index: &str, node: &str) -> Shard {
    Shard::started(index, "0", ShardType::Primary, node)
}

/// A started replica copy of `index` shard 0 on `node`.
pub fn replica(index: &str, node: &str) -> Shard {
    Shard::started(index, "0", ShardType::Replica, node)
}

/// An unassigned replica copy of `index` shard 0.
pub fn unassigned_replica(index: &str) -> Shard {
    Shard {
        index: index.to_string(),
        shard: "0".to_string(),
        shard_type: ShardType::Replica,
        state: ShardState::Unassigned,
        node: None,
    }
}
