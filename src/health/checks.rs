//! Scoring policy for the individual health checks
//!
//! Each evaluator turns already-gathered data into a [`HealthCheckResult`].
//! Thresholds here are part of the gating contract.

use crate::fleet::{FleetListing, PodPhase, PodSummary};

use super::types::{CheckStatus, HealthCheckResult};

pub const NODE_HEALTH: &str = "Node Health";
pub const FLEET_CAPACITY: &str = "Fleet Capacity";
pub const SYSTEM_WORKLOADS: &str = "Critical System Workloads";
pub const PDB_COVERAGE: &str = "Pod Disruption Budget Coverage";
pub const RESOURCE_BALANCE: &str = "Resource Balance";

/// Minimum CPU headroom (percent) for a PASS
pub const HEADROOM_PASS: f64 = 30.0;
/// Minimum CPU headroom (percent) for a WARN; below is FAIL
pub const HEADROOM_WARN: f64 = 15.0;

/// Score assigned to checks that could not gather their data
pub const DEGRADED_SCORE: u8 = 70;

fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((part * 100) / whole).min(100) as u8
}

/// Ready capacity across all managed node groups.
///
/// A group that could not be described counts as a problem group with
/// unknown size: it adds nothing to either the ready or the total count.
pub fn evaluate_node_health(fleet: &FleetListing) -> HealthCheckResult {
    let mut total: u64 = 0;
    let mut ready: u64 = 0;
    let mut problems = Vec::new();
    let group_count = fleet.len();

    for ng in &fleet.groups {
        let desired = ng.scaling.desired_size.max(0) as u64;
        total += desired;
        if ng.is_healthy() {
            ready += desired;
        } else if ng.health_issues.is_empty() {
            problems.push(format!("{}: status {}", ng.name, ng.status));
        } else {
            problems.push(format!(
                "{}: status {} ({})",
                ng.name,
                ng.status,
                ng.health_issues.join(", ")
            ));
        }
    }
    for (name, error) in &fleet.unreadable {
        problems.push(format!("{name}: could not be described ({error})"));
    }

    let score = percent(ready, total);

    if ready == 0 {
        let message = if fleet.is_empty() {
            "No node groups found".to_string()
        } else {
            format!("No ready nodes across {group_count} node group(s)")
        };
        return HealthCheckResult::new(NODE_HEALTH, CheckStatus::Fail, 0, message, true)
            .with_details(problems);
    }

    if problems.is_empty() {
        HealthCheckResult::new(
            NODE_HEALTH,
            CheckStatus::Pass,
            score,
            format!("All {group_count} node group(s) healthy ({ready}/{total} nodes ready)"),
            true,
        )
    } else {
        HealthCheckResult::new(
            NODE_HEALTH,
            CheckStatus::Warn,
            score,
            format!(
                "{} of {group_count} node group(s) have problems ({ready}/{total} nodes ready)",
                problems.len()
            ),
            true,
        )
        .with_details(problems)
    }
}

/// CPU headroom across the instances backing the fleet
pub fn evaluate_capacity(cpu_samples: &[f64]) -> HealthCheckResult {
    if cpu_samples.is_empty() {
        return HealthCheckResult::degraded(
            FLEET_CAPACITY,
            "No CPU datapoints for any fleet instance",
            "Verify detailed monitoring is enabled for the node group instances",
            true,
        );
    }

    let avg = cpu_samples.iter().sum::<f64>() / cpu_samples.len() as f64;
    let headroom = (100.0 - avg).max(0.0);
    let score = ((headroom * 100.0 / HEADROOM_PASS) as u64).min(100) as u8;
    let message = format!(
        "Average CPU {avg:.1}% across {} instance(s), headroom {headroom:.1}%",
        cpu_samples.len()
    );

    let status = if headroom >= HEADROOM_PASS {
        CheckStatus::Pass
    } else if headroom >= HEADROOM_WARN {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    };

    let result = HealthCheckResult::new(FLEET_CAPACITY, status, score, message, true);
    match status {
        CheckStatus::Pass => result,
        _ => result.with_details(vec![format!(
            "Rolling replacement needs spare capacity; scale out before updating (target headroom >= {HEADROOM_PASS}%)"
        )]),
    }
}

/// Readiness of pods in the system namespaces
pub fn evaluate_system_workloads(pods: &[PodSummary]) -> HealthCheckResult {
    let relevant: Vec<&PodSummary> = pods
        .iter()
        .filter(|p| p.phase != PodPhase::Succeeded)
        .collect();

    if relevant.is_empty() {
        return HealthCheckResult::new(
            SYSTEM_WORKLOADS,
            CheckStatus::Pass,
            100,
            "No running system pods to evaluate",
            true,
        );
    }

    let total = relevant.len() as u64;
    let not_ready: Vec<String> = relevant
        .iter()
        .filter(|p| !p.is_ready())
        .map(|p| format!("{}/{} ({:?})", p.namespace, p.name, p.phase))
        .collect();
    let ready = total - not_ready.len() as u64;
    let score = percent(ready, total);
    let message = format!("{ready}/{total} system pods ready");

    let status = if ready == total {
        CheckStatus::Pass
    } else if ready * 10 >= total * 9 {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    };

    HealthCheckResult::new(SYSTEM_WORKLOADS, status, score, message, true).with_details(not_ready)
}

/// Deployment and budget counts for one namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceCoverage {
    pub namespace: String,
    pub deployments: usize,
    pub budgets: usize,
}

/// Pod disruption budget coverage of application namespaces; never FAILs
pub fn evaluate_pdb_coverage(coverage: &[NamespaceCoverage]) -> HealthCheckResult {
    let total: u64 = coverage.iter().map(|c| c.deployments as u64).sum();
    if total == 0 {
        return HealthCheckResult::new(
            PDB_COVERAGE,
            CheckStatus::Pass,
            100,
            "No deployments in application namespaces",
            false,
        );
    }

    let covered: u64 = coverage
        .iter()
        .map(|c| c.deployments.min(c.budgets) as u64)
        .sum();
    let gaps: Vec<String> = coverage
        .iter()
        .filter(|c| c.budgets < c.deployments)
        .map(|c| {
            format!(
                "{}: {} deployment(s), {} disruption budget(s)",
                c.namespace, c.deployments, c.budgets
            )
        })
        .collect();

    if gaps.is_empty() {
        return HealthCheckResult::new(
            PDB_COVERAGE,
            CheckStatus::Pass,
            100,
            format!("All {total} deployment(s) covered by disruption budgets"),
            false,
        );
    }

    HealthCheckResult::new(
        PDB_COVERAGE,
        CheckStatus::Warn,
        percent(covered, total),
        format!("{covered}/{total} deployment(s) covered by disruption budgets"),
        false,
    )
    .with_details(gaps)
}

/// Spread of CPU utilization across instances
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CpuStats {
    pub mean: f64,
    /// Population standard deviation
    pub stddev: f64,
    pub peak: f64,
}

pub fn cpu_stats(samples: &[f64]) -> Option<CpuStats> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let stddev = (samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    let peak = samples.iter().copied().fold(f64::MIN, f64::max);
    Some(CpuStats {
        mean,
        stddev,
        peak,
    })
}

/// How evenly load is spread over the fleet; never blocks
pub fn evaluate_resource_balance(cpu_samples: &[f64]) -> HealthCheckResult {
    let Some(stats) = cpu_stats(cpu_samples) else {
        return HealthCheckResult::degraded(
            RESOURCE_BALANCE,
            "No CPU datapoints to evaluate balance",
            "Verify detailed monitoring is enabled for the node group instances",
            false,
        );
    };

    let penalty = 2.0 * (stats.stddev - 30.0).max(0.0) + 3.0 * (stats.peak - 85.0).max(0.0);
    let score = (100.0 - penalty).clamp(0.0, 100.0) as u8;
    let message = format!(
        "CPU spread {:.1} (stddev), peak {:.1}%, mean {:.1}%",
        stats.stddev, stats.peak, stats.mean
    );

    if stats.peak > 90.0 || stats.stddev > 40.0 {
        HealthCheckResult::new(RESOURCE_BALANCE, CheckStatus::Warn, score, message, false)
            .with_details(vec![
                "Severe imbalance: draining the hottest instances may overload the rest".to_string(),
            ])
    } else if stats.peak > 80.0 || stats.stddev > 25.0 {
        HealthCheckResult::new(RESOURCE_BALANCE, CheckStatus::Warn, score, message, false)
            .with_details(vec![
                "Moderate imbalance: consider rebalancing workloads before updating".to_string(),
            ])
    } else {
        HealthCheckResult::new(RESOURCE_BALANCE, CheckStatus::Pass, score, message, false)
    }
}
