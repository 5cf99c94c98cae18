//! Pre-flight cluster health evaluation
//!
//! Five independent checks are scored 0-100 and folded into a single
//! PROCEED / WARN / BLOCK decision that gates node group mutations.

pub mod checker;
pub mod checks;
pub mod types;

pub use checker::{HealthCheckConfig, HealthChecker};
pub use checks::{
    FLEET_CAPACITY, NODE_HEALTH, PDB_COVERAGE, RESOURCE_BALANCE, SYSTEM_WORKLOADS,
};
pub use types::{CheckStatus, Decision, HealthCheckResult, HealthSummary};
