//! File-backed fleet snapshot
//!
//! Lets operators evaluate a fleet from an exported description (YAML or
//! JSON) when live provider credentials are not at hand.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ComputeMetrics, FleetInventory, ImageResolver, NodeGroup, NodeGroupPage};
use crate::error::{Error, Result};

/// One instance and its observed CPU utilization
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SnapshotInstance {
    pub id: String,
    #[serde(default)]
    pub cpu: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNodeGroup {
    #[serde(flatten)]
    pub group: NodeGroup,
    /// Image id the group's instances currently run
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub instances: Vec<SnapshotInstance>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestImage {
    pub ami_type: String,
    pub image_id: String,
}

/// A point-in-time description of one cluster's fleet
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub cluster: String,
    pub version: String,
    #[serde(default)]
    pub node_groups: Vec<SnapshotNodeGroup>,
    #[serde(default)]
    pub latest_images: Vec<LatestImage>,
}

impl FleetSnapshot {
    /// Load a snapshot, choosing the format from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw),
            _ => Self::from_yaml(&raw),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_yaml::from_str(raw)?;
        snapshot.validate()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(raw)?;
        snapshot.validate()
    }

    fn validate(mut self) -> Result<Self> {
        if self.cluster.is_empty() {
            return Err(Error::ConfigError("snapshot has no cluster name".into()));
        }
        let cluster = self.cluster.clone();
        for ng in &mut self.node_groups {
            if ng.group.cluster_name.is_empty() {
                ng.group.cluster_name = cluster.clone();
            }
        }
        Ok(self)
    }

    fn group(&self, cluster: &str, name: &str) -> Result<&SnapshotNodeGroup> {
        if cluster != self.cluster {
            return Err(Error::ProviderError(format!(
                "snapshot describes cluster {}, not {cluster}",
                self.cluster
            )));
        }
        self.node_groups
            .iter()
            .find(|ng| ng.group.name == name)
            .ok_or_else(|| Error::NodeGroupNotFound(name.to_string()))
    }

    fn cpu_by_instance(&self) -> HashMap<&str, Option<f64>> {
        self.node_groups
            .iter()
            .flat_map(|ng| ng.instances.iter())
            .map(|i| (i.id.as_str(), i.cpu))
            .collect()
    }
}

#[async_trait]
impl FleetInventory for FleetSnapshot {
    async fn list_node_groups_page(
        &self,
        cluster: &str,
        _next_token: Option<String>,
    ) -> Result<NodeGroupPage> {
        if cluster != self.cluster {
            return Ok(NodeGroupPage::default());
        }
        Ok(NodeGroupPage {
            names: self
                .node_groups
                .iter()
                .map(|ng| ng.group.name.clone())
                .collect(),
            next_token: None,
        })
    }

    async fn describe_node_group(&self, cluster: &str, name: &str) -> Result<NodeGroup> {
        Ok(self.group(cluster, name)?.group.clone())
    }

    async fn list_instances(&self, cluster: &str, node_group: &NodeGroup) -> Result<Vec<String>> {
        Ok(self
            .group(cluster, &node_group.name)?
            .instances
            .iter()
            .map(|i| i.id.clone())
            .collect())
    }

    async fn cluster_version(&self, _cluster: &str) -> Result<String> {
        Ok(self.version.clone())
    }
}

#[async_trait]
impl ComputeMetrics for FleetSnapshot {
    async fn average_cpu(&self, instance_id: &str, _window: Duration) -> Result<Option<f64>> {
        Ok(self.cpu_by_instance().get(instance_id).copied().flatten())
    }
}

#[async_trait]
impl ImageResolver for FleetSnapshot {
    async fn current_image_id(
        &self,
        cluster: &str,
        node_group: &NodeGroup,
    ) -> Result<Option<String>> {
        Ok(self.group(cluster, &node_group.name)?.image_id.clone())
    }

    async fn latest_image_id(&self, k8s_version: &str, ami_type: &str) -> Result<Option<String>> {
        if k8s_version != self.version {
            return Ok(None);
        }
        Ok(self
            .latest_images
            .iter()
            .find(|l| l.ami_type == ami_type)
            .map(|l| l.image_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::NodeGroupStatus;

    const SNAPSHOT: &str = r#"
cluster: prod
version: "1.30"
latestImages:
  - amiType: AL2_x86_64
    imageId: ami-0new
nodeGroups:
  - name: workers
    status: ACTIVE
    scaling:
      minSize: 1
      maxSize: 6
      desiredSize: 3
    amiType: AL2_x86_64
    imageId: ami-0old
    instances:
      - id: i-1
        cpu: 41.5
      - id: i-2
  - name: batch
    status: DEGRADED
    healthIssues: ["AsgInstanceLaunchFailures"]
"#;

    #[tokio::test]
    async fn test_snapshot_serves_inventory() {
        let snapshot = FleetSnapshot::from_yaml(SNAPSHOT).unwrap();

        let page = snapshot.list_node_groups_page("prod", None).await.unwrap();
        assert_eq!(page.names, vec!["workers", "batch"]);
        assert!(page.next_token.is_none());

        let workers = snapshot.describe_node_group("prod", "workers").await.unwrap();
        assert_eq!(workers.cluster_name, "prod");
        assert_eq!(workers.scaling.desired_size, 3);

        let batch = snapshot.describe_node_group("prod", "batch").await.unwrap();
        assert_eq!(batch.status, NodeGroupStatus::Degraded);
        assert!(!batch.is_healthy());

        assert!(matches!(
            snapshot.describe_node_group("prod", "missing").await,
            Err(Error::NodeGroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_serves_metrics_and_images() {
        let snapshot = FleetSnapshot::from_yaml(SNAPSHOT).unwrap();
        let window = Duration::from_secs(600);

        assert_eq!(snapshot.average_cpu("i-1", window).await.unwrap(), Some(41.5));
        assert_eq!(snapshot.average_cpu("i-2", window).await.unwrap(), None);

        let workers = snapshot.describe_node_group("prod", "workers").await.unwrap();
        assert_eq!(
            snapshot.current_image_id("prod", &workers).await.unwrap(),
            Some("ami-0old".to_string())
        );
        assert_eq!(
            snapshot.latest_image_id("1.30", "AL2_x86_64").await.unwrap(),
            Some("ami-0new".to_string())
        );
        assert_eq!(snapshot.latest_image_id("1.29", "AL2_x86_64").await.unwrap(), None);
    }

    #[test]
    fn test_snapshot_requires_cluster() {
        let err = FleetSnapshot::from_json(r#"{"cluster": "", "version": "1.30"}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_snapshot_load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        std::fs::write(&path, r#"{"cluster": "prod", "version": "1.30"}"#).unwrap();

        let snapshot = FleetSnapshot::load(&path).unwrap();
        assert_eq!(snapshot.cluster, "prod");
        assert!(snapshot.node_groups.is_empty());
    }
}
