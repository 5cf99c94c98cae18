//! nodegroup-guard: health-gated rolling updates for managed Kubernetes node groups
//!
//! This crate evaluates cluster health before node group mutations, predicts
//! what a rolling update would do, and observes in-flight updates until they
//! finish, time out, or are interrupted.

pub mod cache;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod fleet;
pub mod gate;
pub mod health;
pub mod monitor;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use crate::error::{Error, Result};
