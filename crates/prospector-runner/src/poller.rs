//! Bounded retry for game server calls.
//!
//! Every call gets a per-attempt timeout. Definitive answers (success or a
//! domain error) return at once; transport failures are retried after
//! `interval` until the attempt budget or the optional absolute deadline
//! runs out.

use std::future::Future;
use std::time::Duration;

use prospector_core::ApiError;
use prospector_core::config::PollerConfig;
use tokio::time::Instant;
use tracing::debug;

/// Retry policy for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    /// 0 means unbounded.
    max_attempts: u32,
}

impl Poller {
    /// Build a poller from its configuration section.
    pub const fn from_config(config: &PollerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }

    /// Run `attempt` until it gives a definitive answer or the budget runs out.
    ///
    /// With a `deadline`, no attempt starts after it and no attempt runs
    /// past it.
    pub async fn run<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        mut attempt: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempts = 0_u32;
        loop {
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return Err(ApiError::DeadlineReached);
            }
            if self.max_attempts > 0 && attempts >= self.max_attempts {
                return Err(ApiError::AttemptsExhausted { attempts });
            }
            attempts = attempts.saturating_add(1);

            let mut cutoff = now.checked_add(self.timeout).unwrap_or(now);
            if let Some(deadline) = deadline {
                cutoff = cutoff.min(deadline);
            }
            let outcome = tokio::time::timeout_at(cutoff, attempt())
                .await
                .unwrap_or(Err(ApiError::Timeout));
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => debug!(attempt = attempts, %err, "attempt failed"),
            }

            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn poller(timeout_ms: u64, interval_ms: u64, max_attempts: u32) -> Poller {
        Poller::from_config(&PollerConfig {
            timeout_ms,
            interval_ms,
            max_attempts,
        })
    }

    /// Fails with a transport error `failures` times, then succeeds.
    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<u32, ApiError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(ApiError::Transport("connection reset".to_owned()))
        } else {
            Ok(n)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = poller(100, 10, 5).run(None, || flaky(&calls, 2)).await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn domain_errors_return_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = poller(100, 10, 5)
            .run(None, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::TreasureNotFound)
            })
            .await;
        assert_eq!(result, Err(ApiError::TreasureNotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = poller(100, 0, 3).run(None, || flaky(&calls, u32::MAX)).await;
        assert_eq!(result, Err(ApiError::AttemptsExhausted { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let result: Result<(), _> = poller(50, 0, 2)
            .run(None, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(ApiError::AttemptsExhausted { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_attempts_stop_at_deadline() {
        let calls = AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_millis(250);
        let result = poller(1_000, 100, 0)
            .run(Some(deadline), || flaky(&calls, u32::MAX))
            .await;
        assert_eq!(result, Err(ApiError::DeadlineReached));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_is_cut_at_deadline() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let started = Instant::now();
        let result: Result<(), _> = poller(10_000, 0, 0)
            .run(Some(deadline), || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(ApiError::DeadlineReached));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
