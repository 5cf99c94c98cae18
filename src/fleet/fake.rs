//! In-memory fakes of the fleet collaborators for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ComputeMetrics, ControlPlane, FleetInventory, ImageResolver, NodeGroup, NodeGroupPage,
    NodeGroupStatus, NodeSummary, ObjectRef, PodPhase, PodSummary, RemoteUpdate,
    RemoteUpdateState, ScaleRequest, ScalingConfig, UpdateProvider, UpdateRequest,
};
use crate::error::{Error, Result};

pub const AMI_TYPE: &str = "AL2_x86_64";

pub fn node_group(name: &str, desired: i32) -> NodeGroup {
    NodeGroup {
        name: name.to_string(),
        cluster_name: "prod".to_string(),
        status: NodeGroupStatus::Active,
        scaling: ScalingConfig {
            min_size: 0,
            max_size: desired.max(1) * 2,
            desired_size: desired,
        },
        ami_type: Some(AMI_TYPE.to_string()),
        release_version: Some("1.30.0-20240601".to_string()),
        autoscaling_groups: vec![format!("eks-{name}-asg")],
        health_issues: vec![],
    }
}

/// One scripted answer to `describe_update`
#[derive(Clone, Debug)]
pub enum FakePoll {
    State(RemoteUpdateState, Vec<String>),
    Transient,
    Permanent,
}

#[derive(Default)]
struct FleetState {
    groups: Vec<NodeGroup>,
    instances: HashMap<String, Vec<String>>,
    cpu: HashMap<String, f64>,
    describe_failures: HashSet<String>,
    instance_failures: HashSet<String>,
    current_images: HashMap<String, String>,
    latest_images: HashMap<(String, String), String>,
    polls: HashMap<String, VecDeque<FakePoll>>,
    submitted_updates: Vec<UpdateRequest>,
    submitted_scales: Vec<ScaleRequest>,
}

/// Fake provider covering inventory, metrics, images and update submission
pub struct FakeFleet {
    cluster: String,
    version: Mutex<Option<String>>,
    page_size: usize,
    list_failure: Mutex<bool>,
    metrics_failure: Mutex<bool>,
    state: Mutex<FleetState>,
    page_calls: AtomicUsize,
    cpu_calls: AtomicUsize,
    latest_calls: AtomicUsize,
    describe_update_calls: AtomicUsize,
}

impl FakeFleet {
    pub fn new(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            version: Mutex::new(Some("1.30".to_string())),
            page_size: 100,
            list_failure: Mutex::new(false),
            metrics_failure: Mutex::new(false),
            state: Mutex::new(FleetState::default()),
            page_calls: AtomicUsize::new(0),
            cpu_calls: AtomicUsize::new(0),
            latest_calls: AtomicUsize::new(0),
            describe_update_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Register a node group with `(instance_id, cpu_percent)` pairs
    pub fn add_group(&self, group: NodeGroup, instances: Vec<(&str, f64)>) {
        let mut state = self.state.lock().unwrap();
        let ids = instances.iter().map(|(id, _)| id.to_string()).collect();
        for (id, cpu) in instances {
            state.cpu.insert(id.to_string(), cpu);
        }
        state.instances.insert(group.name.clone(), ids);
        state.groups.push(group);
    }

    pub fn set_cpu(&self, instance_id: &str, cpu: f64) {
        self.state
            .lock()
            .unwrap()
            .cpu
            .insert(instance_id.to_string(), cpu);
    }

    pub fn fail_describe(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .describe_failures
            .insert(name.to_string());
    }

    pub fn fail_instances(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .instance_failures
            .insert(name.to_string());
    }

    pub fn fail_listing(&self) {
        *self.list_failure.lock().unwrap() = true;
    }

    pub fn fail_metrics(&self) {
        *self.metrics_failure.lock().unwrap() = true;
    }

    pub fn clear_version(&self) {
        *self.version.lock().unwrap() = None;
    }

    pub fn set_current_image(&self, group: &str, image: &str) {
        self.state
            .lock()
            .unwrap()
            .current_images
            .insert(group.to_string(), image.to_string());
    }

    pub fn set_latest_image(&self, version: &str, image: &str) {
        self.state
            .lock()
            .unwrap()
            .latest_images
            .insert((version.to_string(), AMI_TYPE.to_string()), image.to_string());
    }

    /// Script successive `describe_update` answers; the last one repeats
    pub fn script_update(&self, update_id: &str, polls: Vec<FakePoll>) {
        self.state
            .lock()
            .unwrap()
            .polls
            .insert(update_id.to_string(), polls.into());
    }

    pub fn submitted_updates(&self) -> Vec<UpdateRequest> {
        self.state.lock().unwrap().submitted_updates.clone()
    }

    pub fn submitted_scales(&self) -> Vec<ScaleRequest> {
        self.state.lock().unwrap().submitted_scales.clone()
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn cpu_calls(&self) -> usize {
        self.cpu_calls.load(Ordering::SeqCst)
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn describe_update_calls(&self) -> usize {
        self.describe_update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FleetInventory for FakeFleet {
    async fn list_node_groups_page(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<NodeGroupPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if *self.list_failure.lock().unwrap() {
            return Err(Error::TransientProviderError("ListNodegroups throttled".into()));
        }
        if cluster != self.cluster {
            return Ok(NodeGroupPage::default());
        }

        let state = self.state.lock().unwrap();
        let start: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(state.groups.len());
        let names = state.groups[start..end]
            .iter()
            .map(|g| g.name.clone())
            .collect();
        let next_token = (end < state.groups.len()).then(|| end.to_string());

        Ok(NodeGroupPage { names, next_token })
    }

    async fn describe_node_group(&self, _cluster: &str, name: &str) -> Result<NodeGroup> {
        let state = self.state.lock().unwrap();
        if state.describe_failures.contains(name) {
            return Err(Error::ProviderError(format!("DescribeNodegroup {name} denied")));
        }
        state
            .groups
            .iter()
            .find(|g| g.name == name)
            .cloned()
            .ok_or_else(|| Error::NodeGroupNotFound(name.to_string()))
    }

    async fn list_instances(&self, _cluster: &str, node_group: &NodeGroup) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.instance_failures.contains(&node_group.name) {
            return Err(Error::ProviderError(format!(
                "DescribeAutoScalingGroups for {} denied",
                node_group.name
            )));
        }
        Ok(state
            .instances
            .get(&node_group.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn cluster_version(&self, _cluster: &str) -> Result<String> {
        self.version
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::ProviderError("DescribeCluster denied".into()))
    }
}

#[async_trait]
impl ComputeMetrics for FakeFleet {
    async fn average_cpu(&self, instance_id: &str, _window: Duration) -> Result<Option<f64>> {
        self.cpu_calls.fetch_add(1, Ordering::SeqCst);
        if *self.metrics_failure.lock().unwrap() {
            return Err(Error::TransientProviderError("GetMetricStatistics timed out".into()));
        }
        Ok(self.state.lock().unwrap().cpu.get(instance_id).copied())
    }
}

#[async_trait]
impl ImageResolver for FakeFleet {
    async fn current_image_id(
        &self,
        _cluster: &str,
        node_group: &NodeGroup,
    ) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .current_images
            .get(&node_group.name)
            .cloned())
    }

    async fn latest_image_id(&self, k8s_version: &str, ami_type: &str) -> Result<Option<String>> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .unwrap()
            .latest_images
            .get(&(k8s_version.to_string(), ami_type.to_string()))
            .cloned())
    }
}

#[async_trait]
impl UpdateProvider for FakeFleet {
    async fn submit_update(&self, request: &UpdateRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.submitted_updates.push(request.clone());
        Ok(format!("upd-{}", state.submitted_updates.len()))
    }

    async fn submit_scale(&self, request: &ScaleRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.submitted_scales.push(request.clone());
        Ok(format!("scale-{}", state.submitted_scales.len()))
    }

    async fn describe_update(
        &self,
        _cluster: &str,
        _nodegroup: &str,
        update_id: &str,
    ) -> Result<RemoteUpdate> {
        self.describe_update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let script = state
            .polls
            .get_mut(update_id)
            .ok_or_else(|| Error::ProviderError(format!("unknown update {update_id}")))?;

        let poll = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match poll {
            Some(FakePoll::State(state, errors)) => Ok(RemoteUpdate { state, errors }),
            Some(FakePoll::Transient) => Err(Error::TransientProviderError("connection reset".into())),
            Some(FakePoll::Permanent) | None => {
                Err(Error::ProviderError(format!("update {update_id} not found")))
            }
        }
    }
}

/// Fake Kubernetes control plane
#[derive(Default)]
pub struct FakeControlPlane {
    pub namespaces: Vec<String>,
    pub pods: Vec<PodSummary>,
    pub deployments: Vec<ObjectRef>,
    pub pdbs: Vec<ObjectRef>,
    pub nodes: Vec<NodeSummary>,
    pub fail: bool,
}

impl FakeControlPlane {
    /// Healthy system namespace plus an application namespace with full PDB coverage
    pub fn healthy() -> Self {
        let mut cp = Self {
            namespaces: vec!["kube-system".into(), "default".into(), "shop".into()],
            ..Default::default()
        };
        for name in ["coredns-1", "coredns-2", "aws-node-x", "kube-proxy-y"] {
            cp.pods.push(pod("kube-system", name, PodPhase::Running, true));
        }
        cp.deployments.push(object("shop", "frontend"));
        cp.deployments.push(object("shop", "checkout"));
        cp.pdbs.push(object("shop", "frontend-pdb"));
        cp.pdbs.push(object("shop", "checkout-pdb"));
        cp
    }
}

pub fn pod(namespace: &str, name: &str, phase: PodPhase, ready: bool) -> PodSummary {
    PodSummary {
        name: name.to_string(),
        namespace: namespace.to_string(),
        phase,
        ready,
    }
}

pub fn object(namespace: &str, name: &str) -> ObjectRef {
    ObjectRef {
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

impl FakeControlPlane {
    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(Error::TransientProviderError("apiserver unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.namespaces.clone())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        _label_selector: Option<&str>,
    ) -> Result<Vec<PodSummary>> {
        self.check()?;
        Ok(self
            .pods
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<ObjectRef>> {
        self.check()?;
        Ok(self
            .deployments
            .iter()
            .filter(|d| d.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_pod_disruption_budgets(&self, namespace: &str) -> Result<Vec<ObjectRef>> {
        self.check()?;
        Ok(self
            .pdbs
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>> {
        self.check()?;
        Ok(self.nodes.clone())
    }
}
