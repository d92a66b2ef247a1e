//! Exponential backoff with jitter for remote calls.

use crate::error::{ApiError, ApiResult};
use log::{debug, warn};
use rand::Rng;
use std::time::Duration;

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for the un-jittered wait.
    pub max_delay: Duration,
    /// Growth factor applied after every failed attempt.
    pub multiplier: f64,
    /// Relative jitter, `0.1` spreads each wait over 90%..110%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 1.5,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, but a different starting delay. Handy for tests.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// The next un-jittered delay after `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. Between attempts the thread sleeps for
/// the current backoff delay, or for the server's `Retry-After` when that is longer.
/// The last error is returned once the budget is exhausted.
pub fn retry_with_backoff<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut(u32) -> ApiResult<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut last_err: Option<ApiError> = None;

    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{label} succeeded on attempt {attempt}/{attempts}");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt < attempts {
                    let mut wait = policy.jittered(delay);
                    if let Some(retry_after) = err.retry_after() {
                        wait = wait.max(retry_after);
                    }
                    warn!(
                        "{label} failed (attempt {attempt}/{attempts}): {err}; retrying in {}ms",
                        wait.as_millis()
                    );
                    std::thread::sleep(wait);
                    delay = policy.next_delay(delay);
                }
                last_err = Some(err);
            }
        }
    }

    warn!("{label} failed after {attempts} attempts");
    Err(last_err.unwrap_or(ApiError::Transport(format!("{label}: no attempt was made"))))
}
