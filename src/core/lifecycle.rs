//! Pending/active membership transitions for in-flight orders.
//!
//! An in-flight order sits in exactly one of the two sets; a terminal order
//! in neither. These sets are what [`crate::core::BootstrapRecovery`]
//! rebuilds after a restart.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::{Admission, MembershipStore, OrderId, RetryPolicy, StoreError};

/// Drives orders through the membership sets.
#[derive(Clone)]
pub struct OrderLifecycle {
    membership: Arc<dyn MembershipStore>,
    retry: RetryPolicy,
}

impl OrderLifecycle {
    /// Create a lifecycle tracker over a membership store.
    pub fn new(membership: Arc<dyn MembershipStore>, retry: RetryPolicy) -> Self {
        Self { membership, retry }
    }

    /// Enter a freshly admitted order into `pending`, or straight into
    /// `active` when its visibility time has already arrived.
    pub async fn track_admitted(
        &self,
        admission: &Admission,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if admission.visible_at <= now {
            self.activate(&admission.order_id).await
        } else {
            self.retry
                .run("mark_pending", || {
                    self.membership
                        .mark_pending(&admission.order_id, admission.visible_at)
                })
                .await
        }
    }

    /// Show the order to production now.
    pub async fn activate(&self, order_id: &OrderId) -> Result<(), StoreError> {
        self.retry
            .run("mark_active", || self.membership.mark_active(order_id))
            .await
    }

    /// Promote every pending order whose visibility time is at or before `now`.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>, StoreError> {
        let promoted = self
            .retry
            .run("promote_due", || self.membership.promote_due(now))
            .await?;
        if !promoted.is_empty() {
            tracing::info!(count = promoted.len(), "orders became visible to production");
        }
        Ok(promoted)
    }

    /// Remove a delivered or cancelled order from both sets.
    pub async fn complete(&self, order_id: &OrderId) -> Result<(), StoreError> {
        self.retry
            .run("clear_membership", || self.membership.clear_membership(order_id))
            .await
    }
}
