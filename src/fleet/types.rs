//! Data exchanged with fleet collaborators

use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed node group as reported by the provider
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeGroupStatus {
    Active,
    Creating,
    Updating,
    Deleting,
    CreateFailed,
    DeleteFailed,
    Degraded,
}

impl NodeGroupStatus {
    pub fn is_updating(&self) -> bool {
        matches!(self, NodeGroupStatus::Updating)
    }
}

impl std::fmt::Display for NodeGroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeGroupStatus::Active => "ACTIVE",
            NodeGroupStatus::Creating => "CREATING",
            NodeGroupStatus::Updating => "UPDATING",
            NodeGroupStatus::Deleting => "DELETING",
            NodeGroupStatus::CreateFailed => "CREATE_FAILED",
            NodeGroupStatus::DeleteFailed => "DELETE_FAILED",
            NodeGroupStatus::Degraded => "DEGRADED",
        };
        f.write_str(s)
    }
}

/// Scaling bounds of a node group
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingConfig {
    pub min_size: i32,
    pub max_size: i32,
    pub desired_size: i32,
}

/// Description of a managed node group
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub name: String,
    #[serde(default)]
    pub cluster_name: String,
    pub status: NodeGroupStatus,
    #[serde(default)]
    pub scaling: ScalingConfig,
    /// Provider image family, e.g. `AL2_x86_64`
    #[serde(default)]
    pub ami_type: Option<String>,
    #[serde(default)]
    pub release_version: Option<String>,
    /// Backing compute groups (auto scaling groups)
    #[serde(default)]
    pub autoscaling_groups: Vec<String>,
    /// Health issues reported by the provider, empty when healthy
    #[serde(default)]
    pub health_issues: Vec<String>,
}

impl NodeGroup {
    pub fn is_healthy(&self) -> bool {
        self.status == NodeGroupStatus::Active && self.health_issues.is_empty()
    }
}

/// One page of node group names
#[derive(Clone, Debug, Default)]
pub struct NodeGroupPage {
    pub names: Vec<String>,
    pub next_token: Option<String>,
}

/// Pod phase as reported by the control plane
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    /// Value of the pod's `Ready` condition
    pub ready: bool,
}

impl PodSummary {
    pub fn is_ready(&self) -> bool {
        self.phase == PodPhase::Running && self.ready
    }
}

/// Namespaced reference to a workload or policy object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSummary {
    pub name: String,
    /// Provider-assigned identifier, e.g. `aws:///us-east-1a/i-0abc`
    pub provider_id: Option<String>,
    pub ready: bool,
    pub node_group: Option<String>,
}

impl NodeSummary {
    /// Instance id extracted from the provider id
    pub fn instance_id(&self) -> Option<&str> {
        self.provider_id
            .as_deref()
            .and_then(|id| id.rsplit('/').next())
            .filter(|id| !id.is_empty())
    }
}

/// State of an asynchronous remote mutation
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteUpdateState {
    InProgress,
    Successful,
    Failed,
    Cancelled,
}

/// Status of an operation handle as returned by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteUpdate {
    pub state: RemoteUpdateState,
    /// Errors the provider attached to the operation itself
    pub errors: Vec<String>,
}

/// Rolling machine-image update of one node group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub cluster_name: String,
    pub nodegroup_name: String,
    /// Target release; `None` lets the provider pick the latest
    pub release_version: Option<String>,
    /// Replace nodes even if pods cannot be drained within budget
    pub force: bool,
}

/// Change of a node group's scaling bounds
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleRequest {
    pub cluster_name: String,
    pub nodegroup_name: String,
    pub desired_size: i32,
    pub min_size: Option<i32>,
    pub max_size: Option<i32>,
}
