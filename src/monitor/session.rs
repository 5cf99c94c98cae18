//! Timer-driven monitoring session

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::board::{PollResult, PollTarget, ProgressBoard};
use super::retry::{retry_with_backoff, RetryPolicy};
use super::types::{MonitorConfig, MonitorReport, SessionOutcome, UpdateProgress, UpdateStatus};
use crate::fleet::UpdateProvider;

/// Drives remote updates to a terminal status
pub struct UpdateMonitor {
    provider: Arc<dyn UpdateProvider>,
    config: MonitorConfig,
}

impl UpdateMonitor {
    pub fn new(provider: Arc<dyn UpdateProvider>, config: MonitorConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Poll every update until all are terminal, the session times out, or
    /// `cancel` fires.
    ///
    /// Stopping early only stops observation; remote updates keep running and
    /// are reported as unresolved.
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub async fn monitor(
        &self,
        updates: Vec<UpdateProgress>,
        cancel: CancellationToken,
    ) -> MonitorReport {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let policy = RetryPolicy::from(&self.config);
        let board = ProgressBoard::new(updates);

        let mut ticker = interval(self.config.poll_interval.max(std::time::Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            if board.all_terminal().await {
                break SessionOutcome::Completed;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break SessionOutcome::UserCancelled,
                _ = sleep_until(deadline) => break SessionOutcome::TimedOut,
                _ = ticker.tick() => {}
            }

            let targets = board.pending().await;
            debug!("Polling {} updates", targets.len());

            // Results are merged as they arrive, so an interrupt mid-tick keeps
            // every answer that came back before it.
            let polls = self.poll_all(targets, &policy, &cancel, deadline);
            tokio::pin!(polls);
            let interrupted = loop {
                tokio::select! {
                    biased;
                    next = polls.next() => match next {
                        Some(result) => {
                            for done in board.apply(vec![result], Utc::now()).await {
                                log_transition(&done);
                            }
                        }
                        None => break None,
                    },
                    _ = cancel.cancelled() => break Some(SessionOutcome::UserCancelled),
                    _ = sleep_until(deadline) => break Some(SessionOutcome::TimedOut),
                }
            };
            if let Some(outcome) = interrupted {
                break outcome;
            }

            self.log_progress(&board).await;
        };

        let report = MonitorReport {
            outcome,
            updates: board.into_inner(),
            elapsed: started.elapsed(),
        };

        match outcome {
            SessionOutcome::Completed => info!("Monitoring finished. {}", report),
            _ => warn!(
                "Monitoring stopped before all updates finished; remote updates keep running. {}",
                report
            ),
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_monitor_report(&report);

        report
    }

    /// One bounded fan-out of status queries; results are merged by the caller
    fn poll_all<'a>(
        &'a self,
        targets: Vec<PollTarget>,
        policy: &'a RetryPolicy,
        cancel: &'a CancellationToken,
        deadline: Instant,
    ) -> impl Stream<Item = PollResult> + 'a {
        stream::iter(targets)
            .map(move |target| {
                let provider = self.provider.clone();
                async move {
                    let outcome = retry_with_backoff(policy, cancel, deadline, || {
                        provider.describe_update(
                            &target.cluster_name,
                            &target.nodegroup_name,
                            &target.update_id,
                        )
                    })
                    .await
                    .map_err(|e| {
                        debug!("Status query for {} failed: {}", target.update_id, e);
                        e.to_string()
                    });
                    PollResult {
                        index: target.index,
                        outcome,
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
    }

    async fn log_progress(&self, board: &ProgressBoard) {
        let snapshot = board.snapshot().await;
        let done = snapshot.iter().filter(|u| u.status.is_terminal()).count();
        let failed = snapshot
            .iter()
            .filter(|u| matches!(u.status, UpdateStatus::Failed | UpdateStatus::Cancelled))
            .count();

        if self.config.quiet {
            debug!(
                "Progress: {}/{} finished ({} failed)",
                done,
                snapshot.len(),
                failed
            );
        } else {
            info!(
                "Progress: {}/{} finished ({} failed)",
                done,
                snapshot.len(),
                failed
            );
            for u in snapshot.iter().filter(|u| !u.status.is_terminal()) {
                match &u.error_message {
                    Some(msg) => info!(
                        "  {} ({}): {} after {}s - {}",
                        u.nodegroup_name,
                        u.update_id,
                        u.status,
                        u.duration().as_secs(),
                        msg
                    ),
                    None => info!(
                        "  {} ({}): {} after {}s",
                        u.nodegroup_name,
                        u.update_id,
                        u.status,
                        u.duration().as_secs()
                    ),
                }
            }
        }
    }
}

fn log_transition(update: &UpdateProgress) {
    match update.status {
        UpdateStatus::Successful => info!(
            "Update {} of {} succeeded after {}s",
            update.update_id,
            update.nodegroup_name,
            update.duration().as_secs()
        ),
        status => warn!(
            "Update {} of {} ended {}: {}",
            update.update_id,
            update.nodegroup_name,
            status,
            update.error_message.as_deref().unwrap_or("no details")
        ),
    }
}

/// Cancel `token` on the first ctrl-c.
///
/// The task ends on its own once `token` is cancelled by anything else, so
/// callers that cancel the session themselves can drop the handle.
pub fn shutdown_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("Interrupted; stopping observation. Remote updates keep running");
                    token.cancel();
                }
                Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
            },
        }
    })
}
