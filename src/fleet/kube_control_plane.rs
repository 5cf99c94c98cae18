//! Control-plane access through the Kubernetes API

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use super::{ControlPlane, NodeSummary, ObjectRef, PodPhase, PodSummary};
use crate::error::Result;

/// Node label carrying the managed node group name
pub const NODEGROUP_LABEL: &str = "eks.amazonaws.com/nodegroup";

/// [`ControlPlane`] backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig or in-cluster service account
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

fn object_ref<K: ResourceExt>(obj: &K, namespace: &str) -> ObjectRef {
    ObjectRef {
        name: obj.name_any(),
        namespace: obj.namespace().unwrap_or_else(|| namespace.to_string()),
    }
}

pub(crate) fn pod_summary(pod: &Pod) -> PodSummary {
    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::parse)
        .unwrap_or(PodPhase::Unknown);
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    PodSummary {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        phase,
        ready,
    }
}

pub(crate) fn node_summary(node: &Node) -> NodeSummary {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    NodeSummary {
        name: node.name_any(),
        provider_id: node.spec.as_ref().and_then(|s| s.provider_id.clone()),
        ready,
        node_group: node.labels().get(NODEGROUP_LABEL).cloned(),
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<PodSummary>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        let list = api.list(&lp).await?;
        debug!("Listed {} pods in {}", list.items.len(), namespace);
        Ok(list.items.iter().map(pod_summary).collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<ObjectRef>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|d| object_ref(d, namespace)).collect())
    }

    async fn list_pod_disruption_budgets(&self, namespace: &str) -> Result<Vec<ObjectRef>> {
        let api: Api<PodDisruptionBudget> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|p| object_ref(p, namespace)).collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(node_summary).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        NodeCondition, NodeSpec, NodeStatus, PodCondition, PodStatus,
    };
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn make_pod(phase: &str, ready: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("coredns-abc".to_string()),
                namespace: Some("kube-system".to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_pod_summary_running_ready() {
        let summary = pod_summary(&make_pod("Running", "True"));
        assert_eq!(summary.name, "coredns-abc");
        assert_eq!(summary.namespace, "kube-system");
        assert_eq!(summary.phase, PodPhase::Running);
        assert!(summary.is_ready());
    }

    #[test]
    fn test_pod_summary_running_not_ready() {
        let summary = pod_summary(&make_pod("Running", "False"));
        assert!(!summary.is_ready());
    }

    #[test]
    fn test_pod_summary_without_status() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("pending".to_string()),
                ..Default::default()
            },
            spec: None,
            status: None,
        };
        let summary = pod_summary(&pod);
        assert_eq!(summary.phase, PodPhase::Unknown);
        assert!(!summary.ready);
    }

    #[test]
    fn test_node_summary_reads_label_and_provider_id() {
        let mut labels = BTreeMap::new();
        labels.insert(NODEGROUP_LABEL.to_string(), "workers".to_string());
        let node = Node {
            metadata: ObjectMeta {
                name: Some("ip-10-0-0-1".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some("aws:///us-east-1a/i-0123".to_string()),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        let summary = node_summary(&node);
        assert!(summary.ready);
        assert_eq!(summary.node_group.as_deref(), Some("workers"));
        assert_eq!(summary.instance_id(), Some("i-0123"));
    }
}
