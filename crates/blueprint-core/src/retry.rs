//! Exponential backoff and request pacing.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::error::AppError;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Five attempts starting at one second, used for every rate-limited
    /// write to Appwrite and Meilisearch.
    pub const fn rate_limit() -> Self {
        Self::new(5, Duration::from_millis(1000))
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Runs `op` until it succeeds, `should_retry` rejects the error, or the
/// policy runs out of attempts. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    P: Fn(&AppError) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && should_retry(&e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retries `op` only while it fails with [`AppError::RateLimitExceeded`].
///
/// Any other error propagates on first occurrence. When every attempt is
/// rate limited the result is [`AppError::RetriesExhausted`].
pub async fn retry_on_rate_limit<T, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    match retry_with_backoff(policy, AppError::is_rate_limited, op).await {
        Err(AppError::RateLimitExceeded) => Err(AppError::RetriesExhausted {
            attempts: policy.max_attempts.max(1),
        }),
        other => other,
    }
}

/// Enforces a minimum interval between consecutive callers.
///
/// The first call passes immediately; later calls sleep until
/// `min_interval` has elapsed since the previous one.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
