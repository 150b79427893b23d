//! Inverse of admission.

use std::sync::Arc;

use crate::core::audit;
use crate::core::{AuditSink, CapacityStore, OrderId, OrderLifecycle, RetryPolicy, StoreError};

/// Returns reserved capacity to its slot.
///
/// Safe to call any number of times and for orders that were never
/// admitted, so cancellation paths can call it without checking first.
#[derive(Clone)]
pub struct ReleaseCoordinator {
    store: Arc<dyn CapacityStore>,
    lifecycle: OrderLifecycle,
    retry: RetryPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl ReleaseCoordinator {
    /// Create a coordinator over the capacity store.
    pub fn new(
        store: Arc<dyn CapacityStore>,
        lifecycle: OrderLifecycle,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            lifecycle,
            retry,
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Subtract the order's recorded reservation from its slot.
    pub async fn release(&self, order_id: &OrderId) -> Result<(), StoreError> {
        let released = self
            .retry
            .run("release", || self.store.release(order_id))
            .await?;
        match released {
            Some(association) => {
                tracing::info!(
                    order_id = %order_id,
                    slot_id = %association.slot_id,
                    amount = association.price,
                    "released slot capacity"
                );
                audit::record(
                    self.audit.as_ref(),
                    Some(*order_id),
                    Some(association.slot_id),
                    "release",
                    Some(association.price.to_string()),
                );
            }
            None => tracing::debug!(order_id = %order_id, "no reservation to release"),
        }
        Ok(())
    }

    /// Release capacity and drop the order from the membership sets.
    pub async fn cancel(&self, order_id: &OrderId) -> Result<(), StoreError> {
        self.release(order_id).await?;
        self.lifecycle.complete(order_id).await?;
        audit::record(self.audit.as_ref(), Some(*order_id), None, "cancel", None);
        Ok(())
    }
}
