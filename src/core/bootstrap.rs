//! Startup reconciliation of membership sets from durable order storage.
//!
//! Slot load counters are not rebuilt here. They are a cache; the registry
//! covers the gap with its membership fallback until new reservations
//! repopulate them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::audit;
use crate::core::{
    AppResult, Association, AuditSink, InFlightOrder, MembershipStore, OrderId, OrderStore,
    RetryPolicy, SlotClock,
};
use crate::util::Clock;

/// Outcome of one recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Distinct in-flight orders placed into a membership set.
    pub restored: usize,
    /// Orders placed into `pending`.
    pub pending: usize,
    /// Orders placed into `active`.
    pub active: usize,
    /// Reverse associations re-created.
    pub associations: usize,
    /// Set members with no in-flight order behind them, removed.
    pub evicted: usize,
}

/// Rebuilds `pending`, `active` and the order→slot index after a restart.
#[derive(Clone)]
pub struct BootstrapRecovery {
    orders: Arc<dyn OrderStore>,
    membership: Arc<dyn MembershipStore>,
    slots: SlotClock,
    lead: Duration,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl BootstrapRecovery {
    /// Create a recovery pass over the given stores.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        membership: Arc<dyn MembershipStore>,
        slots: SlotClock,
        lead: Duration,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            orders,
            membership,
            slots,
            lead,
            clock,
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

    /// Reconcile the membership sets with durable storage.
    ///
    /// # Errors
    ///
    /// Fails when the order store cannot be listed or a membership write
    /// keeps failing after retries. A failed run may be repeated safely.
    pub async fn restore(&self) -> AppResult<RecoveryReport> {
        let now = self.clock.now();
        let listed = self
            .retry
            .run("list_in_flight", || self.orders.list_in_flight())
            .await
            .context("failed to list in-flight orders")?;

        let in_flight: BTreeMap<OrderId, InFlightOrder> = listed
            .into_iter()
            .filter(|order| !order.status.is_terminal())
            .map(|order| (order.order_id, order))
            .collect();

        let mut report = RecoveryReport::default();
        for order in in_flight.values() {
            let visible_at = self.visibility_of(order, now);
            if order.status.in_production() || visible_at <= now {
                self.retry
                    .run("mark_active", || self.membership.mark_active(&order.order_id))
                    .await
                    .with_context(|| format!("failed to activate order {}", order.order_id))?;
                report.active += 1;
            } else {
                self.retry
                    .run("mark_pending", || {
                        self.membership.mark_pending(&order.order_id, visible_at)
                    })
                    .await
                    .with_context(|| format!("failed to queue order {}", order.order_id))?;
                report.pending += 1;
            }
            report.restored += 1;

            if self.restore_association(order).await? {
                report.associations += 1;
            }
        }

        report.evicted = self.evict_stale(&in_flight).await?;

        tracing::info!(
            restored = report.restored,
            pending = report.pending,
            active = report.active,
            associations = report.associations,
            evicted = report.evicted,
            "membership state recovered"
        );
        audit::record(
            self.audit.as_ref(),
            None,
            None,
            "recover",
            serde_json::to_string(&report).ok(),
        );
        Ok(report)
    }

    fn visibility_of(&self, order: &InFlightOrder, now: DateTime<Utc>) -> DateTime<Utc> {
        order
            .visible_at
            .or_else(|| {
                order
                    .slot_id
                    .and_then(|id| self.slots.window_of(id))
                    .map(|window| window.start - self.lead)
            })
            .unwrap_or(now)
    }

    /// Re-create the reverse index entry unless a live one exists.
    async fn restore_association(&self, order: &InFlightOrder) -> AppResult<bool> {
        let Some(slot_id) = order.slot_id else {
            return Ok(false);
        };
        if order.value <= 0 {
            tracing::warn!(order_id = %order.order_id, value = order.value, "skipping association with non-positive value");
            return Ok(false);
        }
        let existing = self
            .retry
            .run("association", || self.membership.association(&order.order_id))
            .await
            .with_context(|| format!("failed to read association of {}", order.order_id))?;
        if existing.is_some() {
            return Ok(false);
        }
        let Some(window) = self.slots.window_of(slot_id) else {
            tracing::warn!(order_id = %order.order_id, slot_id = %slot_id, "skipping association with unrepresentable slot");
            return Ok(false);
        };
        let association = Association {
            slot_id,
            price: order.value,
        };
        self.retry
            .run("restore_association", || {
                self.membership
                    .restore_association(&order.order_id, association, window.end)
            })
            .await
            .with_context(|| format!("failed to restore association of {}", order.order_id))?;
        Ok(true)
    }

    async fn evict_stale(&self, in_flight: &BTreeMap<OrderId, InFlightOrder>) -> AppResult<usize> {
        let pending = self
            .retry
            .run("pending_orders", || self.membership.pending_orders())
            .await
            .context("failed to list pending orders")?;
        let active = self
            .retry
            .run("active_orders", || self.membership.active_orders())
            .await
            .context("failed to list active orders")?;

        let stale: BTreeSet<OrderId> = pending
            .into_iter()
            .chain(active)
            .filter(|id| !in_flight.contains_key(id))
            .collect();
        for order_id in &stale {
            tracing::debug!(order_id = %order_id, "evicting stale member");
            self.retry
                .run("clear_membership", || self.membership.clear_membership(order_id))
                .await
                .with_context(|| format!("failed to evict order {order_id}"))?;
        }
        Ok(stale.len())
    }
}
