//! Retry with exponential backoff for status queries

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::MonitorConfig;
use crate::error::Result;

/// Upper bound on a single backoff sleep
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub multiplier: f64,
}

impl From<&MonitorConfig> for RetryPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: config.base_backoff,
            multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (0-based): base * multiplier^attempt, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(16) as i32);
        let secs = self.base_backoff.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            return MAX_BACKOFF;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Run `op` until it succeeds, fails permanently or runs out of attempts.
///
/// Only transient errors are retried. No attempt is started once `cancel`
/// has fired or `deadline` has passed, and backoff sleeps end early on
/// either; the last error is returned in that case.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    deadline: Instant,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        attempt += 1;
        if !err.is_transient() || attempt >= attempts {
            return Err(err);
        }
        if cancel.is_cancelled() || Instant::now() >= deadline {
            debug!("Session ending; not retrying: {}", err);
            return Err(err);
        }

        let delay = policy.backoff(attempt - 1);
        debug!(
            "Attempt {}/{} failed: {}; retrying in {:?}",
            attempt, attempts, err, delay
        );

        #[cfg(feature = "metrics")]
        crate::metrics::record_status_poll_retry();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(err),
            _ = sleep_until(deadline) => return Err(err),
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    // ── backoff ────────────────────────────────────────────────────────────

    #[test]
    fn test_backoff_grows_and_caps() {
        let p = policy(3);
        assert_eq!(p.backoff(0), Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(10), MAX_BACKOFF);
        assert_eq!(p.backoff(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_backoff_never_shrinks() {
        let p = RetryPolicy {
            multiplier: 0.5,
            ..policy(3)
        };
        assert_eq!(p.backoff(3), Duration::from_secs(1));
    }

    // ── retry loop ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_backoff(&policy(3), &CancellationToken::new(), far_deadline(), || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(Error::TransientProviderError("timeout".into())),
                _ => Ok("done"),
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> =
            retry_with_backoff(&policy(3), &CancellationToken::new(), far_deadline(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::TransientProviderError("throttled".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::TransientProviderError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> =
            retry_with_backoff(&policy(3), &CancellationToken::new(), far_deadline(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::ProviderError("update not found".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::ProviderError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_session_stops_retrying() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(&policy(5), &cancel, far_deadline(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::TransientProviderError("reset".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_ends_at_deadline() {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(500);
        let slow = RetryPolicy {
            base_backoff: Duration::from_secs(30),
            ..policy(5)
        };
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(&slow, &CancellationToken::new(), deadline, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::TransientProviderError("reset".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
