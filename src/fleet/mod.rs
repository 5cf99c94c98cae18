//! Fleet collaborators
//!
//! Narrow interfaces over the cloud provider and the Kubernetes control plane.
//! The orchestration core only ever talks to these traits; concrete clients
//! live behind them.

pub mod cached;
#[cfg(test)]
pub(crate) mod fake;
pub mod kube_control_plane;
pub mod snapshot;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

pub use cached::{CachedImageResolver, CachedMetrics};
pub use kube_control_plane::KubeControlPlane;
pub use snapshot::FleetSnapshot;
pub use types::{
    NodeGroup, NodeGroupPage, NodeGroupStatus, NodeSummary, ObjectRef, PodPhase, PodSummary,
    RemoteUpdate, RemoteUpdateState, ScaleRequest, ScalingConfig, UpdateRequest,
};

/// Managed node group inventory
#[async_trait]
pub trait FleetInventory: Send + Sync {
    /// List one page of node group names for a cluster
    async fn list_node_groups_page(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<NodeGroupPage>;

    async fn describe_node_group(&self, cluster: &str, name: &str) -> Result<NodeGroup>;

    /// Instance ids currently backing a node group
    async fn list_instances(&self, cluster: &str, node_group: &NodeGroup) -> Result<Vec<String>>;

    /// Control-plane Kubernetes version, e.g. `1.30`
    async fn cluster_version(&self, cluster: &str) -> Result<String>;
}

/// Per-instance utilization metrics
#[async_trait]
pub trait ComputeMetrics: Send + Sync {
    /// Average CPU utilization (percent) over the trailing `window`.
    ///
    /// `Ok(None)` means the instance reported no datapoints.
    async fn average_cpu(&self, instance_id: &str, window: Duration) -> Result<Option<f64>>;
}

/// Read-only view of the Kubernetes control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<PodSummary>>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<ObjectRef>>;

    async fn list_pod_disruption_budgets(&self, namespace: &str) -> Result<Vec<ObjectRef>>;

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>>;
}

/// Machine image lookups
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Image id the node group's instances currently run
    async fn current_image_id(&self, cluster: &str, node_group: &NodeGroup)
        -> Result<Option<String>>;

    /// Provider-recommended image id for a control-plane version and image family
    async fn latest_image_id(&self, k8s_version: &str, ami_type: &str) -> Result<Option<String>>;
}

/// Submission and status of remote node group mutations
#[async_trait]
pub trait UpdateProvider: Send + Sync {
    /// Start a rolling image update, returning the operation handle
    async fn submit_update(&self, request: &UpdateRequest) -> Result<String>;

    /// Change scaling bounds, returning the operation handle
    async fn submit_scale(&self, request: &ScaleRequest) -> Result<String>;

    async fn describe_update(
        &self,
        cluster: &str,
        nodegroup: &str,
        update_id: &str,
    ) -> Result<RemoteUpdate>;
}

/// An optional collaborator that may be absent in the current environment.
///
/// Checks consult this instead of treating a missing client as "healthy".
#[derive(Clone, Debug)]
pub enum DataSource<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> DataSource<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        DataSource::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, DataSource::Available(_))
    }
}

impl<T> From<Option<T>> for DataSource<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => DataSource::Available(v),
            None => DataSource::unavailable("not configured"),
        }
    }
}

/// Drain every page of node group names for a cluster
pub async fn list_all_node_groups(
    inventory: &dyn FleetInventory,
    cluster: &str,
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut next_token = None;

    loop {
        let page = inventory.list_node_groups_page(cluster, next_token).await?;
        names.extend(page.names);
        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(names)
}

/// Node groups of one cluster as far as they could be described
#[derive(Clone, Debug, Default)]
pub struct FleetListing {
    pub groups: Vec<NodeGroup>,
    /// `(name, error)` of listed groups whose describe call failed
    pub unreadable: Vec<(String, String)>,
}

impl FleetListing {
    /// Number of listed node groups, described or not
    pub fn len(&self) -> usize {
        self.groups.len() + self.unreadable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Describe every node group in a cluster.
///
/// Only a failed listing is an error; a group that fails to describe is
/// recorded in [`FleetListing::unreadable`] and the rest are still returned.
pub async fn describe_all_node_groups(
    inventory: &dyn FleetInventory,
    cluster: &str,
) -> Result<FleetListing> {
    let names = list_all_node_groups(inventory, cluster).await?;
    let described = futures::future::join_all(
        names
            .iter()
            .map(|name| inventory.describe_node_group(cluster, name)),
    )
    .await;

    let mut listing = FleetListing::default();
    for (name, result) in names.into_iter().zip(described) {
        match result {
            Ok(ng) => listing.groups.push(ng),
            Err(e) => {
                warn!("Failed to describe node group {}: {}", name, e);
                listing.unreadable.push((name, e.to_string()));
            }
        }
    }
    Ok(listing)
}
