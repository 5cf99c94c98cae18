//! Health checker orchestration
//!
//! Gathers fleet and control-plane data for each check and folds the results
//! into a single [`HealthSummary`]. Every check absorbs its own data-gathering
//! failures so one unreachable source never aborts the others.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::checks::{
    self, NamespaceCoverage, FLEET_CAPACITY, NODE_HEALTH, PDB_COVERAGE, RESOURCE_BALANCE,
    SYSTEM_WORKLOADS,
};
use super::types::{CheckStatus, Decision, HealthCheckResult, HealthSummary};
use crate::error::Result;
use crate::fleet::{
    describe_all_node_groups, ComputeMetrics, ControlPlane, DataSource, FleetInventory,
    FleetListing,
};

const KUBECONFIG_GUIDANCE: &str =
    "Configure cluster access (e.g. `aws eks update-kubeconfig --name <cluster>`) to evaluate this check";
const METRICS_GUIDANCE: &str =
    "Grant cloudwatch:GetMetricStatistics to the caller to evaluate CPU utilization";
const INVENTORY_GUIDANCE: &str = "Grant eks:ListNodegroups and eks:DescribeNodegroup, then re-run";

/// Tunables for a health evaluation pass
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Namespaces holding cluster-critical system workloads
    pub system_namespaces: Vec<String>,
    /// Trailing window for CPU averages
    pub cpu_window_secs: u64,
    /// Maximum concurrent metrics queries
    pub metrics_concurrency: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            system_namespaces: vec![
                "kube-system".to_string(),
                "kube-public".to_string(),
                "kube-node-lease".to_string(),
            ],
            cpu_window_secs: 600,
            metrics_concurrency: 16,
        }
    }
}

impl HealthCheckConfig {
    pub fn cpu_window(&self) -> Duration {
        Duration::from_secs(self.cpu_window_secs)
    }

    fn is_system_namespace(&self, namespace: &str) -> bool {
        self.system_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// Why CPU samples could not be gathered
#[derive(Debug)]
struct Degraded {
    message: String,
    guidance: &'static str,
}

/// Runs the fixed set of pre-flight health checks against one cluster
pub struct HealthChecker {
    inventory: Arc<dyn FleetInventory>,
    metrics: DataSource<Arc<dyn ComputeMetrics>>,
    control_plane: DataSource<Arc<dyn ControlPlane>>,
    config: HealthCheckConfig,
}

impl HealthChecker {
    /// Checker with only fleet inventory; metrics and control plane start unavailable
    pub fn new(inventory: Arc<dyn FleetInventory>, config: HealthCheckConfig) -> Self {
        Self {
            inventory,
            metrics: DataSource::unavailable("no metrics client configured"),
            control_plane: DataSource::unavailable("no Kubernetes access configured"),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ComputeMetrics>) -> Self {
        self.metrics = DataSource::Available(metrics);
        self
    }

    pub fn with_control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = DataSource::Available(control_plane);
        self
    }

    pub fn with_control_plane_source(mut self, source: DataSource<Arc<dyn ControlPlane>>) -> Self {
        self.control_plane = source;
        self
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Run all five checks and aggregate them into a decision.
    ///
    /// The fleet is described and sampled once; Node Health, Fleet Capacity
    /// and Resource Balance all evaluate that same data.
    #[instrument(skip(self))]
    pub async fn run_health_checks(&self, cluster: &str) -> HealthSummary {
        let fleet_checks = async {
            let fleet = self.describe_fleet(cluster).await;
            let samples = self.cpu_samples(cluster, &fleet).await;
            (
                node_health(cluster, &fleet),
                capacity(&samples),
                resource_balance(&samples),
            )
        };

        let ((node, capacity, balance), workloads, pdb) = futures::join!(
            fleet_checks,
            self.check_system_workloads(),
            self.check_pdb_coverage(),
        );

        let summary = HealthSummary::from_results(vec![node, capacity, workloads, pdb, balance]);

        for r in &summary.results {
            debug!("{} -> {} (score {}): {}", r.name, r.status, r.score, r.message);
        }
        match summary.decision {
            Decision::Proceed => info!(
                "Health checks for {} passed with score {}",
                cluster, summary.overall_score
            ),
            Decision::Warn => warn!(
                "Health checks for {} raised warnings (score {}): {}",
                cluster,
                summary.overall_score,
                summary.reason()
            ),
            Decision::Block => error!(
                "Health checks for {} blocked (score {}): {}",
                cluster,
                summary.overall_score,
                summary.reason()
            ),
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_health_summary(&summary);

        summary
    }

    pub async fn check_node_health(&self, cluster: &str) -> HealthCheckResult {
        node_health(cluster, &self.describe_fleet(cluster).await)
    }

    pub async fn check_capacity(&self, cluster: &str) -> HealthCheckResult {
        let fleet = self.describe_fleet(cluster).await;
        capacity(&self.cpu_samples(cluster, &fleet).await)
    }

    pub async fn check_resource_balance(&self, cluster: &str) -> HealthCheckResult {
        let fleet = self.describe_fleet(cluster).await;
        resource_balance(&self.cpu_samples(cluster, &fleet).await)
    }

    pub async fn check_system_workloads(&self) -> HealthCheckResult {
        let control_plane = match &self.control_plane {
            DataSource::Available(cp) => cp,
            DataSource::Unavailable { reason } => {
                return HealthCheckResult::degraded(
                    SYSTEM_WORKLOADS,
                    format!("Kubernetes API unavailable ({reason}); system pods not evaluated"),
                    KUBECONFIG_GUIDANCE,
                    true,
                );
            }
        };

        let listings = futures::future::join_all(
            self.config
                .system_namespaces
                .iter()
                .map(|ns| control_plane.list_pods(ns, None)),
        )
        .await;

        let mut pods = Vec::new();
        for (ns, listing) in self.config.system_namespaces.iter().zip(listings) {
            match listing {
                Ok(found) => pods.extend(found),
                Err(e) => {
                    warn!("Failed to list pods in {}: {}", ns, e);
                    return HealthCheckResult::degraded(
                        SYSTEM_WORKLOADS,
                        format!("Could not list pods in {ns}: {e}"),
                        KUBECONFIG_GUIDANCE,
                        true,
                    );
                }
            }
        }

        checks::evaluate_system_workloads(&pods)
    }

    /// Disruption budget coverage of non-system namespaces
    pub async fn check_pdb_coverage(&self) -> HealthCheckResult {
        let control_plane = match &self.control_plane {
            DataSource::Available(cp) => cp,
            DataSource::Unavailable { reason } => {
                return HealthCheckResult::degraded(
                    PDB_COVERAGE,
                    format!("Kubernetes API unavailable ({reason}); disruption budgets not evaluated"),
                    KUBECONFIG_GUIDANCE,
                    false,
                );
            }
        };

        let namespaces = match control_plane.list_namespaces().await {
            Ok(all) => all
                .into_iter()
                .filter(|ns| !self.config.is_system_namespace(ns))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("Failed to list namespaces: {}", e);
                return HealthCheckResult::degraded(
                    PDB_COVERAGE,
                    format!("Could not list namespaces: {e}"),
                    KUBECONFIG_GUIDANCE,
                    false,
                );
            }
        };

        let counts = futures::future::join_all(namespaces.iter().map(|ns| async move {
            let (deployments, budgets) = futures::join!(
                control_plane.list_deployments(ns),
                control_plane.list_pod_disruption_budgets(ns),
            );
            (ns, deployments, budgets)
        }))
        .await;

        let mut coverage = Vec::with_capacity(counts.len());
        for (ns, deployments, budgets) in counts {
            match (deployments, budgets) {
                (Ok(d), Ok(b)) => coverage.push(NamespaceCoverage {
                    namespace: ns.clone(),
                    deployments: d.len(),
                    budgets: b.len(),
                }),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Failed to inspect namespace {}: {}", ns, e);
                    return HealthCheckResult::degraded(
                        PDB_COVERAGE,
                        format!("Could not inspect namespace {ns}: {e}"),
                        KUBECONFIG_GUIDANCE,
                        false,
                    );
                }
            }
        }

        checks::evaluate_pdb_coverage(&coverage)
    }

    async fn describe_fleet(&self, cluster: &str) -> Result<FleetListing> {
        describe_all_node_groups(self.inventory.as_ref(), cluster).await
    }

    /// Per-instance CPU averages across the described node groups.
    ///
    /// Groups that could not be described, or whose instances could not be
    /// listed, are skipped; the samples that did arrive are still used.
    async fn cpu_samples(
        &self,
        cluster: &str,
        fleet: &Result<FleetListing>,
    ) -> std::result::Result<Vec<f64>, Degraded> {
        let metrics = match &self.metrics {
            DataSource::Available(m) => m.clone(),
            DataSource::Unavailable { reason } => {
                return Err(Degraded {
                    message: format!("Metrics unavailable ({reason}); CPU not evaluated"),
                    guidance: METRICS_GUIDANCE,
                });
            }
        };

        let fleet = fleet.as_ref().map_err(|e| Degraded {
            message: format!("Could not enumerate node groups for metrics: {e}"),
            guidance: INVENTORY_GUIDANCE,
        })?;
        for (name, _) in &fleet.unreadable {
            debug!("Skipping CPU sampling for undescribed node group {}", name);
        }

        let listings = futures::future::join_all(
            fleet
                .groups
                .iter()
                .map(|ng| self.inventory.list_instances(cluster, ng)),
        )
        .await;

        let mut instance_ids = Vec::new();
        for (ng, listing) in fleet.groups.iter().zip(listings) {
            match listing {
                Ok(ids) => instance_ids.extend(ids),
                Err(e) => warn!("Failed to list instances of {}: {}", ng.name, e),
            }
        }

        let window = self.config.cpu_window();
        let results: Vec<_> = stream::iter(instance_ids)
            .map(|id| {
                let metrics = metrics.clone();
                async move {
                    let cpu = metrics.average_cpu(&id, window).await;
                    (id, cpu)
                }
            })
            .buffer_unordered(self.config.metrics_concurrency.max(1))
            .collect()
            .await;

        let mut samples = Vec::new();
        let mut first_error = None;
        for (id, cpu) in results {
            match cpu {
                Ok(Some(value)) => samples.push(value),
                Ok(None) => debug!("No CPU datapoints for {}", id),
                Err(e) => {
                    debug!("CPU query failed for {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if samples.is_empty() => Err(Degraded {
                message: format!("Metrics unavailable: {e}"),
                guidance: METRICS_GUIDANCE,
            }),
            Some(e) => {
                warn!("Partial CPU data for {}: {}", cluster, e);
                Ok(samples)
            }
            None => Ok(samples),
        }
    }
}

fn node_health(cluster: &str, fleet: &Result<FleetListing>) -> HealthCheckResult {
    match fleet {
        Ok(listing) => checks::evaluate_node_health(listing),
        Err(e) => {
            warn!("Node group listing failed for {}: {}", cluster, e);
            HealthCheckResult::new(
                NODE_HEALTH,
                CheckStatus::Fail,
                0,
                format!("Failed to list node groups: {e}"),
                true,
            )
            .with_details(vec![INVENTORY_GUIDANCE.to_string()])
        }
    }
}

fn capacity(samples: &std::result::Result<Vec<f64>, Degraded>) -> HealthCheckResult {
    match samples {
        Ok(samples) => checks::evaluate_capacity(samples),
        Err(d) => HealthCheckResult::degraded(FLEET_CAPACITY, d.message.clone(), d.guidance, true),
    }
}

fn resource_balance(samples: &std::result::Result<Vec<f64>, Degraded>) -> HealthCheckResult {
    match samples {
        Ok(samples) => checks::evaluate_resource_balance(samples),
        Err(d) => {
            HealthCheckResult::degraded(RESOURCE_BALANCE, d.message.clone(), d.guidance, false)
        }
    }
}
