//! Access to the Kubernetes resources backing node groups.
//!
//! [`NodeGroupStore`] is the seam between the downscale logic and the API
//! server. [`KubeNodeGroupStore`] implements it with `kube` for one cluster.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::reflector::Store;
use kube::{Api, Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, instrument};

use crate::controller::error::{Error, Result};
use crate::controller::node_group::{NodeGroup, NodeGroupKey};
use crate::downscale::quorum::is_legacy_version;
use crate::resources::common::{
    CLUSTER_NAME_LABEL, VERSION_LABEL, cluster_selector, config_name, headless_service_name,
    roles_from_labels,
};

/// What the downscale logic needs to know about a cluster pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    /// Master-eligible.
    pub master: bool,
    /// Search engine version label.
    pub version: Option<String>,
    /// Ready condition is true.
    pub ready: bool,
    /// Deletion already requested.
    pub terminating: bool,
}

impl PodInfo {
    pub fn from_pod(pod: &Pod) -> Self {
        let labels = pod.labels();
        let ready = pod
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            });
        Self {
            name: pod.name_any(),
            master: roles_from_labels(labels).master,
            version: labels.get(VERSION_LABEL).cloned(),
            ready,
            terminating: pod.metadata.deletion_timestamp.is_some(),
        }
    }

    /// Running, ready and not on its way out.
    pub fn is_running(&self) -> bool {
        self.ready && !self.terminating
    }
}

/// Reads and mutates the resources of one cluster's node groups.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeGroupStore: Send + Sync {
    /// Set the replica count of a group and return the resulting generation.
    ///
    /// Fails with a conflict when the group changed since it was observed.
    async fn update_replicas(&self, group: &NodeGroup, replicas: i32) -> Result<i64>;

    /// Delete the StatefulSet of a group. Not-found errors are reported as such.
    async fn delete_statefulset(&self, key: &NodeGroupKey) -> Result<()>;

    /// Delete the headless Service of a group.
    async fn delete_headless_service(&self, key: &NodeGroupKey) -> Result<()>;

    /// Delete the configuration ConfigMap of a group.
    async fn delete_config(&self, key: &NodeGroupKey) -> Result<()>;

    /// All pods of the cluster.
    async fn cluster_pods(&self) -> Result<Vec<PodInfo>>;

    /// Master-eligible pods of the cluster that are not terminating.
    async fn master_pods(&self) -> Result<Vec<PodInfo>> {
        Ok(self
            .cluster_pods()
            .await?
            .into_iter()
            .filter(|p| p.master && !p.terminating)
            .collect())
    }

    /// Whether at least one group or master pod still runs a version
    /// using the legacy discovery protocol.
    async fn any_member_on_legacy_protocol(&self, groups: &[NodeGroup]) -> Result<bool> {
        for version in groups.iter().filter_map(|g| g.version.as_deref()) {
            if is_legacy_version(version)? {
                return Ok(true);
            }
        }
        for pod in self.master_pods().await? {
            let Some(version) = pod.version.as_deref() else {
                continue;
            };
            if is_legacy_version(version)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `kube`-backed store for one cluster.
#[derive(Clone)]
pub struct KubeNodeGroupStore {
    client: Client,
    namespace: String,
    cluster_name: String,
}

impl KubeNodeGroupStore {
    pub fn new(client: Client, namespace: &str, cluster_name: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            cluster_name: cluster_name.to_string(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Delete an object, mapping a 404 to [`Error::NotFound`].
async fn delete_object<K>(api: &Api<K>, kind: &str, key: &NodeGroupKey, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(group = %key, kind, name, "Deleted");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            Err(Error::NotFound(format!("{} {}/{}", kind, key.namespace, name)))
        }
        Err(e) => Err(Error::Kube(e)),
    }
}

/// A conflict means the group changed since the cache was read.
fn patch_error(key: &NodeGroupKey, error: kube::Error) -> Error {
    match error {
        kube::Error::Api(e) if e.code == 409 => {
            Error::Transient(format!("{} was modified concurrently", key))
        }
        e => Error::Kube(e),
    }
}

#[async_trait]
impl NodeGroupStore for KubeNodeGroupStore {
    #[instrument(skip(self, group), fields(group = %group.key))]
    async fn update_replicas(&self, group: &NodeGroup, replicas: i32) -> Result<i64> {
        let api: Api<StatefulSet> = self.api();
        // resourceVersion makes the patch fail with a conflict on a stale view
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": group.resource_version },
            "spec": { "replicas": replicas }
        });
        let updated = api
            .patch(group.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| patch_error(&group.key, e))?;
        let generation = updated
            .metadata
            .generation
            .ok_or_else(|| Error::MissingField(format!("{}: metadata.generation", group.key)))?;
        debug!(replicas, generation, "Updated replicas");
        Ok(generation)
    }

    async fn delete_statefulset(&self, key: &NodeGroupKey) -> Result<()> {
        let api: Api<StatefulSet> = self.api();
        delete_object(&api, "StatefulSet", key, &key.name).await
    }

    async fn delete_headless_service(&self, key: &NodeGroupKey) -> Result<()> {
        let api: Api<Service> = self.api();
        delete_object(&api, "Service", key, &headless_service_name(&key.name)).await
    }

    async fn delete_config(&self, key: &NodeGroupKey) -> Result<()> {
        let api: Api<ConfigMap> = self.api();
        delete_object(&api, "ConfigMap", key, &config_name(&key.name)).await
    }

    async fn cluster_pods(&self) -> Result<Vec<PodInfo>> {
        let api: Api<Pod> = self.api();
        let pods = api
            .list(&ListParams::default().labels(&cluster_selector(&self.cluster_name)))
            .await?;
        Ok(pods.items.iter().map(PodInfo::from_pod).collect())
    }
}

/// Actual node groups of a cluster, read from the StatefulSet cache.
///
/// Sorted by name so that planning is deterministic.
pub fn actual_node_groups(
    store: &Store<StatefulSet>,
    namespace: &str,
    cluster_name: &str,
) -> Vec<NodeGroup> {
    let mut groups: Vec<NodeGroup> = store
        .state()
        .iter()
        .filter(|sts| sts.namespace().as_deref() == Some(namespace))
        .filter(|sts| belongs_to(sts.labels(), cluster_name))
        .filter_map(|sts| NodeGroup::from_statefulset(sts))
        .collect();
    groups.sort_by(|a, b| a.key.cmp(&b.key));
    groups
}

fn belongs_to(labels: &BTreeMap<String, String>, cluster_name: &str) -> bool {
    labels
        .get(CLUSTER_NAME_LABEL)
        .is_some_and(|c| c == cluster_name)
}
