//! Naming and labelling conventions for resources owned by a SearchCluster.
//!
//! Every node set is backed by a StatefulSet named `<cluster>-<nodeset>`.
//! Pods are named `<statefulset>-<ordinal>`; the same name is used as the
//! node name inside the search cluster. Each StatefulSet has a headless
//! Service and a configuration ConfigMap named after it. The cluster HTTP API
//! is reached through the `<cluster>-http` Service.

use std::collections::BTreeMap;

use crate::crd::NodeRoles;

/// Label holding the owning SearchCluster name.
pub const CLUSTER_NAME_LABEL: &str = "searchoperator.smoketurner.com/cluster-name";
/// Label holding the search engine version of a StatefulSet or pod.
pub const VERSION_LABEL: &str = "searchoperator.smoketurner.com/version";
/// Label holding the hash of the StatefulSet spec it was built from.
pub const TEMPLATE_HASH_LABEL: &str = "searchoperator.smoketurner.com/template-hash";
/// Role labels. Value is "true" or "false".
pub const NODE_MASTER_LABEL: &str = "searchoperator.smoketurner.com/node-master";
pub const NODE_DATA_LABEL: &str = "searchoperator.smoketurner.com/node-data";
pub const NODE_INGEST_LABEL: &str = "searchoperator.smoketurner.com/node-ingest";

/// Name of the StatefulSet backing a node set.
pub fn statefulset_name(cluster_name: &str, node_set: &str) -> String {
    format!("{}-{}", cluster_name, node_set)
}

/// Name of the Service exposing the HTTP API of a cluster.
pub fn http_service_name(cluster_name: &str) -> String {
    format!("{}-http", cluster_name)
}

/// Name of the headless Service of a StatefulSet.
pub fn headless_service_name(statefulset_name: &str) -> String {
    format!("{}-headless", statefulset_name)
}

/// Name of the ConfigMap holding the configuration of a StatefulSet's nodes.
pub fn config_name(statefulset_name: &str) -> String {
    format!("{}-config", statefulset_name)
}

/// Name of the pod (and search node) with the given ordinal.
pub fn pod_name(statefulset_name: &str, ordinal: i32) -> String {
    format!("{}-{}", statefulset_name, ordinal)
}

/// Label selector matching every resource of a cluster.
pub fn cluster_selector(cluster_name: &str) -> String {
    format!("{}={}", CLUSTER_NAME_LABEL, cluster_name)
}

/// Role labels for the given roles.
pub fn role_labels(roles: &NodeRoles) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(NODE_MASTER_LABEL.to_string(), roles.master.to_string());
    labels.insert(NODE_DATA_LABEL.to_string(), roles.data.to_string());
    labels.insert(NODE_INGEST_LABEL.to_string(), roles.ingest.to_string());
    labels
}

/// Read roles back from labels. Missing or malformed labels mean "false".
pub fn roles_from_labels(labels: &BTreeMap<String, String>) -> NodeRoles {
    let flag = |key: &str| labels.get(key).is_some_and(|v| v == "true");
    NodeRoles {
        master: flag(NODE_MASTER_LABEL),
        data: flag(NODE_DATA_LABEL),
        ingest: flag(NODE_INGEST_LABEL),
    }
}
