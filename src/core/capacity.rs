//! Live process-wide capacity configuration.

use std::sync::Arc;

use crate::core::{AdminError, CapacityStore, RetryPolicy, StoreError};

/// Explicit handle on the global max capacity.
///
/// The value lives in the capacity store so that every process sharing the
/// store sees the same ceiling; [`CapacityConfig::current`] reads it on every
/// call and never caches.
#[derive(Clone)]
pub struct CapacityConfig {
    store: Arc<dyn CapacityStore>,
    default_value: i64,
    retry: RetryPolicy,
}

impl CapacityConfig {
    /// Create a handle falling back to `default_value` while the store has none.
    pub fn new(store: Arc<dyn CapacityStore>, default_value: i64, retry: RetryPolicy) -> Self {
        Self {
            store,
            default_value,
            retry,
        }
    }

    /// Replace the retry policy used for store calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Configured fallback capacity.
    pub const fn default_value(&self) -> i64 {
        self.default_value
    }

    /// Capacity in force right now.
    pub async fn current(&self) -> Result<i64, StoreError> {
        let stored = self
            .retry
            .run("global_capacity", || self.store.global_capacity())
            .await?;
        Ok(stored.filter(|v| *v > 0).unwrap_or(self.default_value))
    }

    /// Seed the store with the default when it has no value yet.
    ///
    /// Returns the value in force afterwards.
    pub async fn initialize(&self) -> Result<i64, StoreError> {
        let stored = self
            .retry
            .run("global_capacity", || self.store.global_capacity())
            .await?;
        if let Some(value) = stored.filter(|v| *v > 0) {
            return Ok(value);
        }
        self.retry
            .run("set_global_capacity", || {
                self.store.set_global_capacity(self.default_value)
            })
            .await?;
        tracing::info!(capacity = self.default_value, "seeded global slot capacity");
        Ok(self.default_value)
    }

    /// Administrative update of the global capacity.
    pub async fn update(&self, value: i64) -> Result<(), AdminError> {
        if value <= 0 {
            return Err(AdminError::InvalidCapacity(value));
        }
        self.retry
            .run("set_global_capacity", || self.store.set_global_capacity(value))
            .await?;
        tracing::info!(capacity = value, "global slot capacity updated");
        Ok(())
    }
}
