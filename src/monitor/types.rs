//! Update progress records, monitor tunables and the session report

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::fleet::RemoteUpdateState;

/// Client-side view of one remote update
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    InProgress,
    Successful,
    Failed,
    Cancelled,
}

impl UpdateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpdateStatus::InProgress)
    }
}

impl From<RemoteUpdateState> for UpdateStatus {
    fn from(state: RemoteUpdateState) -> Self {
        match state {
            RemoteUpdateState::InProgress => UpdateStatus::InProgress,
            RemoteUpdateState::Successful => UpdateStatus::Successful,
            RemoteUpdateState::Failed => UpdateStatus::Failed,
            RemoteUpdateState::Cancelled => UpdateStatus::Cancelled,
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStatus::InProgress => "IN_PROGRESS",
            UpdateStatus::Successful => "SUCCESSFUL",
            UpdateStatus::Failed => "FAILED",
            UpdateStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct UpdateProgress {
    pub nodegroup_name: String,
    pub update_id: String,
    pub cluster_name: String,
    pub status: UpdateStatus,
    pub start_time: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl UpdateProgress {
    /// A freshly submitted update
    pub fn new(cluster_name: &str, nodegroup_name: &str, update_id: &str) -> Self {
        Self {
            nodegroup_name: nodegroup_name.to_string(),
            update_id: update_id.to_string(),
            cluster_name: cluster_name.to_string(),
            status: UpdateStatus::InProgress,
            start_time: Utc::now(),
            last_checked: None,
            error_message: None,
        }
    }

    /// Time from submission to the last observation (or to now, if never observed)
    pub fn duration(&self) -> Duration {
        let end = self.last_checked.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }
}

/// Tunables of one monitoring session; fixed once the session starts
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Attempts per status query, including the first
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    pub base_backoff: Duration,
    /// Overall session budget
    pub timeout: Duration,
    /// Demote per-tick progress lines to debug
    pub quiet: bool,
    /// Maximum concurrent status queries per tick
    pub max_concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_retries: 3,
            backoff_multiplier: 2.0,
            base_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(40 * 60),
            quiet: false,
            max_concurrency: 10,
        }
    }
}

/// How a monitoring session ended
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionOutcome {
    Completed,
    TimedOut,
    UserCancelled,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionOutcome::Completed => "COMPLETED",
            SessionOutcome::TimedOut => "TIMED_OUT",
            SessionOutcome::UserCancelled => "USER_CANCELLED",
        };
        f.write_str(s)
    }
}

/// Final summary of a monitoring session.
///
/// Failed updates are data here, not errors; only the session outcome is.
#[derive(Clone, Debug, Serialize)]
pub struct MonitorReport {
    pub outcome: SessionOutcome,
    pub updates: Vec<UpdateProgress>,
    pub elapsed: Duration,
}

impl MonitorReport {
    pub fn successful(&self) -> Vec<&UpdateProgress> {
        self.with_status(|s| s == UpdateStatus::Successful)
    }

    /// Updates that ended FAILED or CANCELLED remotely
    pub fn failed(&self) -> Vec<&UpdateProgress> {
        self.with_status(|s| matches!(s, UpdateStatus::Failed | UpdateStatus::Cancelled))
    }

    pub fn unresolved(&self) -> Vec<&UpdateProgress> {
        self.with_status(|s| !s.is_terminal())
    }

    fn with_status(&self, pred: impl Fn(UpdateStatus) -> bool) -> Vec<&UpdateProgress> {
        self.updates.iter().filter(|u| pred(u.status)).collect()
    }

    fn unresolved_ids(&self) -> Vec<String> {
        self.unresolved()
            .iter()
            .map(|u| format!("{}/{}", u.nodegroup_name, u.update_id))
            .collect()
    }

    /// Surface a timed-out or cancelled session as an error
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            SessionOutcome::Completed => Ok(self),
            SessionOutcome::TimedOut => Err(Error::MonitorTimedOut {
                elapsed: self.elapsed,
                unresolved: self.unresolved_ids(),
            }),
            SessionOutcome::UserCancelled => Err(Error::MonitorCancelled {
                unresolved: self.unresolved_ids(),
            }),
        }
    }
}

impl fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} after {}s: {} successful, {} failed, {} unresolved",
            self.outcome,
            self.elapsed.as_secs(),
            self.successful().len(),
            self.failed().len(),
            self.unresolved().len()
        )?;
        for u in &self.updates {
            write!(
                f,
                "  {} ({}): {} after {}s",
                u.nodegroup_name,
                u.update_id,
                u.status,
                u.duration().as_secs()
            )?;
            if let Some(msg) = &u.error_message {
                write!(f, " - {msg}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
