//! Bounded exponential backoff around a fallible async call

use crate::error::Result;
use crate::models::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy: `max_attempts` tries, waiting `base_delay * multiplier^n`
/// (capped at `max_delay`) between consecutive attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.multiplier.max(1),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds or the attempts are used up
    ///
    /// The closure receives the 1-based attempt number. The last error is
    /// returned once `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
