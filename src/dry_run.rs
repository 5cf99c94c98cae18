//! Dry-run analysis of rolling updates
//!
//! Classifies what an update would do to each node group without mutating
//! anything. Unknown image state is always treated as needing an update.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::fleet::{list_all_node_groups, FleetInventory, ImageResolver, NodeGroup};

/// What an update would do to a node group
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DryRunAction {
    Update,
    SkipAlreadyUpdating,
    SkipAlreadyLatest,
    ForceUpdate,
}

impl DryRunAction {
    pub fn would_update(&self) -> bool {
        matches!(self, DryRunAction::Update | DryRunAction::ForceUpdate)
    }
}

impl fmt::Display for DryRunAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DryRunAction::Update => "UPDATE",
            DryRunAction::SkipAlreadyUpdating => "SKIP_ALREADY_UPDATING",
            DryRunAction::SkipAlreadyLatest => "SKIP_ALREADY_LATEST",
            DryRunAction::ForceUpdate => "FORCE_UPDATE",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DryRunDecision {
    pub name: String,
    pub action: DryRunAction,
    pub current_image_id: Option<String>,
    pub latest_image_id: Option<String>,
    pub reason: String,
}

/// A node group that could not be analyzed
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DryRunFailure {
    pub name: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct DryRunReport {
    pub decisions: Vec<DryRunDecision>,
    pub failures: Vec<DryRunFailure>,
}

impl DryRunReport {
    pub fn decision(&self, name: &str) -> Option<&DryRunDecision> {
        self.decisions.iter().find(|d| d.name == name)
    }

    /// Names of the groups an update would touch
    pub fn to_update(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|d| d.action.would_update())
            .map(|d| d.name.as_str())
            .collect()
    }
}

impl fmt::Display for DryRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.decisions {
            writeln!(f, "{}: {} ({})", d.name, d.action, d.reason)?;
        }
        for failure in &self.failures {
            writeln!(f, "{}: SKIPPED (lookup failed: {})", failure.name, failure.error)?;
        }
        write!(
            f,
            "{} of {} node groups would be updated",
            self.to_update().len(),
            self.decisions.len() + self.failures.len()
        )
    }
}

pub struct DryRunAnalyzer {
    inventory: Arc<dyn FleetInventory>,
    images: Arc<dyn ImageResolver>,
}

impl DryRunAnalyzer {
    pub fn new(inventory: Arc<dyn FleetInventory>, images: Arc<dyn ImageResolver>) -> Self {
        Self { inventory, images }
    }

    /// Classify each named node group, or every group of the cluster when
    /// `names` is empty.
    ///
    /// Only a failure to enumerate the cluster is returned as an error;
    /// per-group lookup failures land in [`DryRunReport::failures`].
    #[instrument(skip(self, names), fields(requested = names.len()))]
    pub async fn analyze(&self, cluster: &str, names: &[String], force: bool) -> Result<DryRunReport> {
        let names = if names.is_empty() {
            list_all_node_groups(self.inventory.as_ref(), cluster).await?
        } else {
            names.to_vec()
        };

        let version = if force {
            None
        } else {
            match self.inventory.cluster_version(cluster).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(
                        "Could not resolve control-plane version of {}: {}; image comparison skipped",
                        cluster, e
                    );
                    None
                }
            }
        };

        let outcomes = futures::future::join_all(
            names
                .iter()
                .map(|name| self.analyze_one(cluster, name, version.as_deref(), force)),
        )
        .await;

        let mut report = DryRunReport::default();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Ok(decision) => {
                    debug!("{}: {} ({})", decision.name, decision.action, decision.reason);
                    report.decisions.push(decision);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    report.failures.push(DryRunFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Dry run for {}: {} to update, {} skipped, {} failed",
            cluster,
            report.to_update().len(),
            report.decisions.len() - report.to_update().len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn analyze_one(
        &self,
        cluster: &str,
        name: &str,
        version: Option<&str>,
        force: bool,
    ) -> Result<DryRunDecision> {
        let group = self.inventory.describe_node_group(cluster, name).await?;

        if group.status.is_updating() {
            return Ok(DryRunDecision {
                name: group.name,
                action: DryRunAction::SkipAlreadyUpdating,
                current_image_id: None,
                latest_image_id: None,
                reason: "an update is already in progress".to_string(),
            });
        }

        if force {
            return Ok(DryRunDecision {
                name: group.name,
                action: DryRunAction::ForceUpdate,
                current_image_id: None,
                latest_image_id: None,
                reason: "force requested; image comparison skipped".to_string(),
            });
        }

        let (current, latest) = self.resolve_images(cluster, &group, version).await;
        let (action, reason) = match (&current, &latest) {
            (Some(c), Some(l)) if c == l => (
                DryRunAction::SkipAlreadyLatest,
                format!("already running the latest image {c}"),
            ),
            (Some(c), Some(l)) => (DryRunAction::Update, format!("image {c} -> {l}")),
            _ => (
                DryRunAction::Update,
                "image ids could not be resolved; treating as outdated".to_string(),
            ),
        };

        Ok(DryRunDecision {
            name: group.name,
            action,
            current_image_id: current,
            latest_image_id: latest,
            reason,
        })
    }

    /// Current and latest image ids; lookup errors count as unknown
    async fn resolve_images(
        &self,
        cluster: &str,
        group: &NodeGroup,
        version: Option<&str>,
    ) -> (Option<String>, Option<String>) {
        let current = async {
            self.images
                .current_image_id(cluster, group)
                .await
                .unwrap_or_else(|e| {
                    debug!("Current image of {} unknown: {}", group.name, e);
                    None
                })
        };
        let latest = async {
            let (Some(version), Some(ami_type)) = (version, group.ami_type.as_deref()) else {
                return None;
            };
            self.images
                .latest_image_id(version, ami_type)
                .await
                .unwrap_or_else(|e| {
                    debug!("Latest image for {} unknown: {}", group.name, e);
                    None
                })
        };

        futures::join!(current, latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::fake::{node_group, FakeFleet};
    use crate::fleet::NodeGroupStatus;

    fn fleet() -> Arc<FakeFleet> {
        let fleet = Arc::new(FakeFleet::new("prod"));
        fleet.add_group(node_group("current", 3), vec![]);
        fleet.add_group(node_group("stale", 3), vec![]);
        fleet.set_current_image("current", "ami-new");
        fleet.set_current_image("stale", "ami-old");
        fleet.set_latest_image("1.30", "ami-new");
        fleet
    }

    fn analyzer(fleet: &Arc<FakeFleet>) -> DryRunAnalyzer {
        DryRunAnalyzer::new(fleet.clone(), fleet.clone())
    }

    #[tokio::test]
    async fn test_matching_image_is_skipped() {
        let fleet = fleet();
        let report = analyzer(&fleet).analyze("prod", &[], false).await.unwrap();

        let current = report.decision("current").unwrap();
        assert_eq!(current.action, DryRunAction::SkipAlreadyLatest);
        let stale = report.decision("stale").unwrap();
        assert_eq!(stale.action, DryRunAction::Update);
        assert_eq!(stale.reason, "image ami-old -> ami-new");
        assert_eq!(report.to_update(), vec!["stale"]);
    }

    #[tokio::test]
    async fn test_force_always_updates() {
        let fleet = fleet();
        let report = analyzer(&fleet).analyze("prod", &[], true).await.unwrap();

        for d in &report.decisions {
            assert_eq!(d.action, DryRunAction::ForceUpdate);
        }
        assert_eq!(fleet.latest_calls(), 0);
    }

    #[tokio::test]
    async fn test_updating_group_is_skipped_even_with_force() {
        let fleet = fleet();
        let mut busy = node_group("busy", 2);
        busy.status = NodeGroupStatus::Updating;
        fleet.add_group(busy, vec![]);

        let names = vec!["busy".to_string()];
        for force in [false, true] {
            let report = analyzer(&fleet).analyze("prod", &names, force).await.unwrap();
            assert_eq!(report.decisions[0].action, DryRunAction::SkipAlreadyUpdating);
        }
    }

    #[tokio::test]
    async fn test_unknown_images_default_to_update() {
        let fleet = fleet();
        fleet.clear_version();
        let report = analyzer(&fleet).analyze("prod", &[], false).await.unwrap();

        let current = report.decision("current").unwrap();
        assert_eq!(current.action, DryRunAction::Update);
        assert!(current.latest_image_id.is_none());
        assert_eq!(fleet.latest_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_isolated() {
        let fleet = fleet();
        fleet.fail_describe("stale");
        let names = vec!["stale".to_string(), "current".to_string(), "ghost".to_string()];

        let report = analyzer(&fleet).analyze("prod", &names, false).await.unwrap();

        assert_eq!(report.decisions.len(), 1);
        assert_eq!(report.decisions[0].name, "current");
        let failed: Vec<_> = report.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(failed, vec!["stale", "ghost"]);
        assert!(report.failures[1].error.contains("not found"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let fleet = fleet();
        fleet.fail_listing();
        assert!(analyzer(&fleet).analyze("prod", &[], false).await.is_err());
    }

    #[tokio::test]
    async fn test_report_display() {
        let fleet = fleet();
        let report = analyzer(&fleet).analyze("prod", &[], false).await.unwrap();
        let text = report.to_string();
        assert!(text.contains("current: SKIP_ALREADY_LATEST"));
        assert!(text.ends_with("1 of 2 node groups would be updated"));
    }
}
