//! Node groups: the StatefulSets making up a search cluster.
//!
//! A [`NodeGroup`] is an in-memory snapshot of one StatefulSet, carrying only
//! what the downscale logic needs: identity, replica count, roles, version and
//! the generation used for expectations. Members are identified by ordinal,
//! so removals always take the highest ordinals first.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;

use crate::crd::{NodeRoles, SearchCluster};
use crate::resources::common::{
    TEMPLATE_HASH_LABEL, VERSION_LABEL, pod_name, roles_from_labels, statefulset_name,
};

/// Namespaced identity of a node group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeGroupKey {
    pub namespace: String,
    pub name: String,
}

impl NodeGroupKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for NodeGroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Snapshot of a StatefulSet-backed group of search nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroup {
    /// Namespace and StatefulSet name.
    pub key: NodeGroupKey,
    /// Declared replica count.
    pub replicas: i32,
    /// Roles of every member.
    pub roles: NodeRoles,
    /// StatefulSet update strategy type ("OnDelete", "RollingUpdate").
    pub update_strategy: Option<String>,
    /// Hash of the spec the StatefulSet was built from.
    pub template_hash: Option<String>,
    /// Search engine version the members run.
    pub version: Option<String>,
    /// `metadata.generation`, used to track our own writes.
    pub generation: Option<i64>,
    /// `metadata.resourceVersion`, used as an update precondition.
    pub resource_version: Option<String>,
}

impl NodeGroup {
    /// Create a node group with default roles and no metadata.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, replicas: i32) -> Self {
        Self {
            key: NodeGroupKey::new(namespace, name),
            replicas,
            roles: NodeRoles::default(),
            update_strategy: None,
            template_hash: None,
            version: None,
            generation: None,
            resource_version: None,
        }
    }

    pub fn with_roles(mut self, roles: NodeRoles) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Build a snapshot from a StatefulSet.
    ///
    /// Roles are read from the pod template labels, since that is what the
    /// pods actually carry. Returns `None` for objects without a name.
    pub fn from_statefulset(sts: &StatefulSet) -> Option<Self> {
        let name = sts.metadata.name.clone()?;
        let namespace = sts.namespace().unwrap_or_else(|| "default".to_string());
        let spec = sts.spec.as_ref();

        let template_labels = spec
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.labels.clone())
            .unwrap_or_default();
        let labels: &BTreeMap<String, String> = sts.labels();

        Some(Self {
            key: NodeGroupKey::new(namespace, name),
            replicas: spec.and_then(|s| s.replicas).unwrap_or(0),
            roles: roles_from_labels(&template_labels),
            update_strategy: spec
                .and_then(|s| s.update_strategy.as_ref())
                .and_then(|u| u.type_.clone()),
            template_hash: labels.get(TEMPLATE_HASH_LABEL).cloned(),
            version: labels
                .get(VERSION_LABEL)
                .or_else(|| template_labels.get(VERSION_LABEL))
                .cloned(),
            generation: sts.metadata.generation,
            resource_version: sts.metadata.resource_version.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn is_master_eligible(&self) -> bool {
        self.roles.master
    }

    /// Pod names of all current members, lowest ordinal first.
    pub fn pod_names(&self) -> Vec<String> {
        (0..self.replicas.max(0))
            .map(|ordinal| pod_name(self.name(), ordinal))
            .collect()
    }
}

/// Names of the pods leaving a group shrinking from `initial` to `target`
/// replicas, highest ordinal first.
///
/// Returns an empty list when `target >= initial`.
pub fn leaving_pod_names(statefulset_name: &str, target: i32, initial: i32) -> Vec<String> {
    (target.max(0)..initial.max(0))
        .rev()
        .map(|ordinal| pod_name(statefulset_name, ordinal))
        .collect()
}

/// Find a group by StatefulSet name.
pub fn find_by_name<'a>(groups: &'a [NodeGroup], name: &str) -> Option<&'a NodeGroup> {
    groups.iter().find(|g| g.name() == name)
}

/// Expected node groups declared by a SearchCluster.
///
/// One group per node set, with the declared count and roles.
pub fn expected_node_groups(cluster: &SearchCluster) -> Vec<NodeGroup> {
    let cluster_name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());

    cluster
        .spec
        .node_sets
        .iter()
        .map(|node_set| {
            NodeGroup::new(
                namespace.clone(),
                statefulset_name(&cluster_name, &node_set.name),
                node_set.count,
            )
            .with_roles(node_set.roles)
            .with_version(cluster.spec.version.clone())
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::crd::{NodeSetSpec, SearchClusterSpec};
    use crate::resources::common::role_labels;
    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetUpdateStrategy};
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn statefulset(name: &str, replicas: Option<i32>, roles: NodeRoles) -> StatefulSet {
        let mut labels = BTreeMap::new();
        labels.insert(VERSION_LABEL.to_string(), "7.10.2".to_string());
        labels.insert(TEMPLATE_HASH_LABEL.to_string(), "abc".to_string());
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                labels: Some(labels),
                generation: Some(3),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas,
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(role_labels(&roles)),
                        ..Default::default()
                    }),
                    spec: None,
                },
                update_strategy: Some(StatefulSetUpdateStrategy {
                    type_: Some("OnDelete".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_from_statefulset() {
        let group =
            NodeGroup::from_statefulset(&statefulset("es-masters", Some(3), NodeRoles::master_only()))
                .unwrap();
        assert_eq!(group.key, NodeGroupKey::new("ns", "es-masters"));
        assert_eq!(group.replicas, 3);
        assert!(group.is_master_eligible());
        assert!(!group.roles.data);
        assert_eq!(group.update_strategy.as_deref(), Some("OnDelete"));
        assert_eq!(group.template_hash.as_deref(), Some("abc"));
        assert_eq!(group.version.as_deref(), Some("7.10.2"));
        assert_eq!(group.generation, Some(3));
        assert_eq!(group.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_from_statefulset_without_replicas() {
        let group =
            NodeGroup::from_statefulset(&statefulset("es-data", None, NodeRoles::data_only()))
                .unwrap();
        assert_eq!(group.replicas, 0);
    }

    #[test]
    fn test_from_statefulset_without_name() {
        let mut sts = statefulset("x", Some(1), NodeRoles::default());
        sts.metadata.name = None;
        assert!(NodeGroup::from_statefulset(&sts).is_none());
    }

    #[test]
    fn test_leaving_pod_names_highest_first() {
        assert_eq!(
            leaving_pod_names("es-data", 2, 5),
            vec!["es-data-4", "es-data-3", "es-data-2"]
        );
    }

    #[test]
    fn test_leaving_pod_names_empty_when_not_shrinking() {
        assert!(leaving_pod_names("es-data", 3, 3).is_empty());
        assert!(leaving_pod_names("es-data", 4, 3).is_empty());
    }

    #[test]
    fn test_leaving_pod_names_full_removal() {
        assert_eq!(leaving_pod_names("es-data", 0, 2), vec!["es-data-1", "es-data-0"]);
    }

    #[test]
    fn test_pod_names() {
        let group = NodeGroup::new("ns", "es-data", 3);
        assert_eq!(group.pod_names(), vec!["es-data-0", "es-data-1", "es-data-2"]);
    }

    #[test]
    fn test_expected_node_groups() {
        let mut cluster = SearchCluster::new(
            "es",
            SearchClusterSpec {
                version: "7.10.2".to_string(),
                node_sets: vec![
                    NodeSetSpec {
                        name: "masters".to_string(),
                        count: 3,
                        roles: NodeRoles::master_only(),
                    },
                    NodeSetSpec {
                        name: "data".to_string(),
                        count: 2,
                        roles: NodeRoles::data_only(),
                    },
                ],
                update_strategy: Default::default(),
                labels: BTreeMap::new(),
            },
        );
        cluster.metadata.namespace = Some("ns".to_string());

        let groups = expected_node_groups(&cluster);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, NodeGroupKey::new("ns", "es-masters"));
        assert_eq!(groups[0].replicas, 3);
        assert!(groups[0].is_master_eligible());
        assert_eq!(groups[1].name(), "es-data");
        assert_eq!(groups[1].version.as_deref(), Some("7.10.2"));
        assert!(find_by_name(&groups, "es-data").is_some());
        assert!(find_by_name(&groups, "es-other").is_none());
    }
}
