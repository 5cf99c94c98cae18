//! Health-gated node group mutations
//!
//! Runs the health checker before (and optionally after) a rolling update or
//! scaling change, refusing to submit anything the checker blocks.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::fleet::{FleetInventory, ScaleRequest, UpdateProvider, UpdateRequest};
use crate::health::{CheckStatus, Decision, HealthCheckResult, HealthChecker, HealthSummary};
use crate::monitor::{MonitorConfig, MonitorReport, UpdateMonitor, UpdateProgress};

/// Per-call gate behaviour
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateOptions {
    /// Run the health checker before mutating
    pub health_check: bool,
    /// Run it again once the mutation is submitted (or finished, with `wait`)
    pub post_validate: bool,
    /// Monitor the submitted operation to a terminal status
    pub wait: bool,
    /// Treat a failing disruption budget check as blocking for scale-downs
    pub pdb_blocking: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            health_check: true,
            post_validate: false,
            wait: false,
            pdb_blocking: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GateOutcome {
    /// Operation handle returned by the provider
    pub update_id: String,
    pub pre_check: Option<HealthSummary>,
    /// Disruption budget check run for a scale-down
    pub pdb_check: Option<HealthCheckResult>,
    pub monitor: Option<MonitorReport>,
    pub post_check: Option<HealthSummary>,
}

/// Whether a disruption budget result stops a scale-down at this call site
pub fn scale_down_blocked(pdb: &HealthCheckResult, pdb_blocking: bool) -> bool {
    pdb.status == CheckStatus::Fail && pdb_blocking
}

pub struct HealthGate {
    checker: Arc<HealthChecker>,
    inventory: Arc<dyn FleetInventory>,
    provider: Arc<dyn UpdateProvider>,
    monitor_config: MonitorConfig,
}

impl HealthGate {
    pub fn new(
        checker: Arc<HealthChecker>,
        inventory: Arc<dyn FleetInventory>,
        provider: Arc<dyn UpdateProvider>,
        monitor_config: MonitorConfig,
    ) -> Self {
        Self {
            checker,
            inventory,
            provider,
            monitor_config,
        }
    }

    /// Submit a rolling image update behind the health gate
    #[instrument(skip(self, options, cancel), fields(cluster = %request.cluster_name, nodegroup = %request.nodegroup_name))]
    pub async fn update_with_health_gate(
        &self,
        request: UpdateRequest,
        options: &GateOptions,
        cancel: CancellationToken,
    ) -> Result<GateOutcome> {
        let operation = format!("update of {}", request.nodegroup_name);

        let pre_check = if options.health_check {
            Some(self.enforce(&operation, &request.cluster_name).await?)
        } else {
            None
        };

        let update_id = self.provider.submit_update(&request).await?;
        info!(
            "Submitted update {} for {} (release {})",
            update_id,
            request.nodegroup_name,
            request.release_version.as_deref().unwrap_or("latest")
        );

        self.after_submit(
            &request.cluster_name,
            &request.nodegroup_name,
            update_id,
            options,
            cancel,
            pre_check,
            None,
        )
        .await
    }

    /// Change scaling bounds behind the health gate
    #[instrument(skip(self, options, cancel), fields(cluster = %request.cluster_name, nodegroup = %request.nodegroup_name))]
    pub async fn scale_with_health_gate(
        &self,
        request: ScaleRequest,
        options: &GateOptions,
        cancel: CancellationToken,
    ) -> Result<GateOutcome> {
        validate_scale(&request)?;
        let operation = format!("scale of {} to {}", request.nodegroup_name, request.desired_size);

        let (pre_check, pdb_check) = if options.health_check {
            let summary = self.enforce(&operation, &request.cluster_name).await?;
            let current = self
                .inventory
                .describe_node_group(&request.cluster_name, &request.nodegroup_name)
                .await?;

            let pdb = if request.desired_size < current.scaling.desired_size {
                Some(self.enforce_scale_down(&operation, options).await?)
            } else {
                None
            };
            (Some(summary), pdb)
        } else {
            (None, None)
        };

        let update_id = self.provider.submit_scale(&request).await?;
        info!(
            "Submitted scaling {} for {} (desired {})",
            update_id, request.nodegroup_name, request.desired_size
        );

        self.after_submit(
            &request.cluster_name,
            &request.nodegroup_name,
            update_id,
            options,
            cancel,
            pre_check,
            pdb_check,
        )
        .await
    }

    /// Run the full check set and apply the BLOCK / WARN policy
    async fn enforce(&self, operation: &str, cluster: &str) -> Result<HealthSummary> {
        let summary = self.checker.run_health_checks(cluster).await;
        match summary.decision {
            Decision::Block => Err(Error::HealthGateBlocked {
                operation: operation.to_string(),
                reason: summary.reason(),
            }),
            Decision::Warn => {
                warn!(
                    "Proceeding with {} despite warnings: {}",
                    operation,
                    summary.reason()
                );
                Ok(summary)
            }
            Decision::Proceed => Ok(summary),
        }
    }

    async fn enforce_scale_down(
        &self,
        operation: &str,
        options: &GateOptions,
    ) -> Result<HealthCheckResult> {
        let mut pdb = self.checker.check_pdb_coverage().await;
        pdb.is_blocking = options.pdb_blocking;

        if scale_down_blocked(&pdb, options.pdb_blocking) {
            return Err(Error::HealthGateBlocked {
                operation: operation.to_string(),
                reason: format!("{}: {}", pdb.name, pdb.message),
            });
        }
        if pdb.status != CheckStatus::Pass {
            warn!("Scaling down with incomplete coverage: {}", pdb.message);
        }
        Ok(pdb)
    }

    #[allow(clippy::too_many_arguments)]
    async fn after_submit(
        &self,
        cluster: &str,
        nodegroup: &str,
        update_id: String,
        options: &GateOptions,
        cancel: CancellationToken,
        pre_check: Option<HealthSummary>,
        pdb_check: Option<HealthCheckResult>,
    ) -> Result<GateOutcome> {
        let monitor = if options.wait {
            let report = UpdateMonitor::new(self.provider.clone(), self.monitor_config.clone())
                .monitor(vec![UpdateProgress::new(cluster, nodegroup, &update_id)], cancel)
                .await
                .into_result()?;

            if let Some(failed) = report.failed().first() {
                return Err(Error::ProviderError(format!(
                    "{} of {} ended {}: {}",
                    failed.update_id,
                    failed.nodegroup_name,
                    failed.status,
                    failed.error_message.as_deref().unwrap_or("no details")
                )));
            }
            Some(report)
        } else {
            None
        };

        let post_check = if options.health_check && options.post_validate {
            let operation = format!("post-validation of {nodegroup} after {update_id}");
            Some(self.enforce(&operation, cluster).await?)
        } else {
            None
        };

        Ok(GateOutcome {
            update_id,
            pre_check,
            pdb_check,
            monitor,
            post_check,
        })
    }
}

fn validate_scale(request: &ScaleRequest) -> Result<()> {
    if request.desired_size < 0 {
        return Err(Error::ConfigError(format!(
            "desired size {} must not be negative",
            request.desired_size
        )));
    }
    if let Some(min) = request.min_size {
        if request.desired_size < min {
            return Err(Error::ConfigError(format!(
                "desired size {} is below min size {min}",
                request.desired_size
            )));
        }
    }
    if let Some(max) = request.max_size {
        if request.desired_size > max {
            return Err(Error::ConfigError(format!(
                "desired size {} is above max size {max}",
                request.desired_size
            )));
        }
    }
    Ok(())
}
