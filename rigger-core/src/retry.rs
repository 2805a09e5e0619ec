//! Bounded exponential backoff for transient control plane failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ControlPlaneError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// How often, and how patiently, a retryable call is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the next attempt after `failures` failed attempts.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the final result and the number of
    /// attempts made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> (Result<T, ControlPlaneError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControlPlaneError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Err(e) if e.is_retryable() && attempts < self.max_attempts => {
                    let delay = self.delay_after(attempts);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient control plane failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return (result, attempts),
            }
        }
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 500ms base delay, 10s cap.
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}
