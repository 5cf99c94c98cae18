//! Lock-guarded progress aggregate owned by one monitoring session

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::{UpdateProgress, UpdateStatus};
use crate::fleet::RemoteUpdate;

const GENERIC_FAILURE: &str = "update failed without error details";

/// A record that still needs a status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollTarget {
    pub index: usize,
    pub cluster_name: String,
    pub nodegroup_name: String,
    pub update_id: String,
}

/// Result of one status query, computed independently of the board
#[derive(Debug)]
pub struct PollResult {
    pub index: usize,
    pub outcome: Result<RemoteUpdate, String>,
}

/// Progress records of one session.
///
/// Readers take snapshots; only [`ProgressBoard::apply`] mutates, from the
/// session task as poll results arrive, and never touches a record that is
/// already terminal.
#[derive(Debug)]
pub struct ProgressBoard {
    updates: RwLock<Vec<UpdateProgress>>,
}

impl ProgressBoard {
    pub fn new(updates: Vec<UpdateProgress>) -> Self {
        Self {
            updates: RwLock::new(updates),
        }
    }

    pub async fn snapshot(&self) -> Vec<UpdateProgress> {
        self.updates.read().await.clone()
    }

    pub fn into_inner(self) -> Vec<UpdateProgress> {
        self.updates.into_inner()
    }

    pub async fn all_terminal(&self) -> bool {
        self.updates.read().await.iter().all(|u| u.status.is_terminal())
    }

    /// Records that are still in progress
    pub async fn pending(&self) -> Vec<PollTarget> {
        self.updates
            .read()
            .await
            .iter()
            .enumerate()
            .filter(|(_, u)| !u.status.is_terminal())
            .map(|(index, u)| PollTarget {
                index,
                cluster_name: u.cluster_name.clone(),
                nodegroup_name: u.nodegroup_name.clone(),
                update_id: u.update_id.clone(),
            })
            .collect()
    }

    /// Merge one tick's poll results; returns the records that became terminal
    pub async fn apply(
        &self,
        results: Vec<PollResult>,
        checked_at: DateTime<Utc>,
    ) -> Vec<UpdateProgress> {
        let mut updates = self.updates.write().await;
        let mut finished = Vec::new();

        for result in results {
            let Some(record) = updates.get_mut(result.index) else {
                continue;
            };
            if record.status.is_terminal() {
                continue;
            }
            record.last_checked = Some(checked_at);

            match result.outcome {
                Ok(remote) => {
                    let status = UpdateStatus::from(remote.state);
                    if !remote.errors.is_empty() {
                        record.error_message = Some(remote.errors.join("; "));
                    } else if status == UpdateStatus::Failed {
                        record.error_message = Some(GENERIC_FAILURE.to_string());
                    } else {
                        // a clean answer supersedes earlier query failures
                        record.error_message = None;
                    }
                    record.status = status;
                    if status.is_terminal() {
                        finished.push(record.clone());
                    }
                }
                Err(e) => {
                    record.error_message = Some(format!("status query failed: {e}"));
                }
            }
        }

        finished
    }
}
