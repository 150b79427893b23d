//! Bounded, jittered retries for store calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::KitchenConfig;
use crate::core::StoreError;

/// Retry and timeout policy shared by every component that talks to a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// Base delay, doubled on every retry.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
    /// I/O timeout applied to each attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Policy described by the configuration.
    pub const fn from_config(cfg: &KitchenConfig) -> Self {
        Self {
            retries: cfg.store_retry_attempts,
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_jitter: Duration::from_millis(cfg.retry_max_jitter_ms),
            timeout: cfg.store_timeout(),
        }
    }

    /// Run `op` once with the I/O timeout applied.
    pub async fn once<T, Fut>(&self, op: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match self.once(op()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "store call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(what, attempts = attempt + 1, error = %err, "store call failed");
                    return Err(err);
                }
            }
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.min(6));
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
        exp.saturating_add(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&KitchenConfig::default())
    }
}
