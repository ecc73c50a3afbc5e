//! Bounded fixed-interval polling.

use std::future::Future;
use std::time::Duration;

use crate::error::WorkerResult;

/// Fixed delay between checks, bounded number of checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the time spent polling.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }

    /// Map attempt `n` of `max_attempts` linearly onto `[from, to]`.
    pub fn progress(&self, attempt: u32, from: f64, to: f64) -> f64 {
        if self.max_attempts == 0 {
            return from;
        }
        let fraction = (attempt as f64 / self.max_attempts as f64).clamp(0.0, 1.0);
        from + (to - from) * fraction
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Sleep `interval`, then run `check(attempt)`, for attempts `1..=max`.
///
/// Returns `Ok(None)` once the attempts are exhausted. An error from a check
/// ends polling immediately.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut check: F) -> WorkerResult<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = WorkerResult<Poll<T>>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        if let Poll::Ready(value) = check(attempt).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
