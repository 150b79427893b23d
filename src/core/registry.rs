//! Read-only day view of slot load for dashboards.
//!
//! Counters are a best-effort cache. When a slot's counter reads zero but
//! orders of that slot sit in the membership sets (for example right after a
//! restart, before any new reservation rebuilt the counter), the load shown is
//! the sum of those orders' reserved amounts instead.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BusinessHours;
use crate::core::{
    CapacityConfig, CapacityStore, MembershipStore, OrderId, RetryPolicy, SlotClock, SlotId,
    SlotPlan, SlotWindow, StoreError,
};
use crate::util::Clock;

/// Where a slot is relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPhase {
    /// The slot has ended.
    Past,
    /// Now falls inside the slot.
    Current,
    /// The slot has not started.
    Future,
}

/// Which path produced [`SlotView::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// The slot's load counter.
    Counter,
    /// Sum of reserved amounts of in-flight members.
    Membership,
    /// Nothing recorded for the slot.
    Empty,
}

/// One slot as presented to reporting consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    /// Slot identifier.
    pub slot_id: SlotId,
    /// Slot start.
    pub start: DateTime<Utc>,
    /// Slot end.
    pub end: DateTime<Utc>,
    /// Position relative to now.
    pub phase: SlotPhase,
    /// Load shown for the slot.
    pub load: i64,
    /// How `load` was obtained.
    pub load_source: LoadSource,
    /// Capacity in force for the slot.
    pub max_capacity: i64,
    /// Whether `max_capacity` comes from a per-slot override.
    pub capacity_overridden: bool,
    /// Remaining room, never negative.
    pub available: i64,
    /// Slot manually closed.
    pub disabled: bool,
    /// Advisory delivery/pickup split.
    pub plan: Option<SlotPlan>,
    /// Orders counted in `load`.
    pub order_ids: Vec<OrderId>,
}

#[derive(Default)]
struct MemberLoad {
    amount: i64,
    orders: Vec<OrderId>,
}

/// Aggregates per-slot state for a trading day.
#[derive(Clone)]
pub struct SlotRegistry {
    slots: SlotClock,
    hours: BusinessHours,
    store: Arc<dyn CapacityStore>,
    membership: Arc<dyn MembershipStore>,
    capacity: CapacityConfig,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl SlotRegistry {
    /// Create a registry over the given stores.
    pub fn new(
        slots: SlotClock,
        hours: BusinessHours,
        store: Arc<dyn CapacityStore>,
        membership: Arc<dyn MembershipStore>,
        capacity: CapacityConfig,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            slots,
            hours,
            store,
            membership,
            capacity,
            clock,
            retry,
        }
    }

    /// Every slot of the current trading day.
    pub async fn list_day(&self) -> Result<Vec<SlotView>, StoreError> {
        let now = self.clock.now();
        self.list_for(now.date_naive()).await
    }

    /// Every slot of `day`, from opening to closing.
    pub async fn list_for(&self, day: NaiveDate) -> Result<Vec<SlotView>, StoreError> {
        let now = self.clock.now();
        let global = self.capacity.current().await?;
        let mut members = self.member_loads().await?;

        let open = self.hours.open_on(day);
        let close = self.hours.close_on(day);
        let mut start = self.slots.start_of(open);
        if start < open {
            start = self.slots.next(start);
        }
        let mut views = Vec::new();
        while self.slots.end_of(start) <= close {
            let window = self.slots.window(start);
            let fallback = members.remove(&window.id).unwrap_or_default();
            views.push(self.view(&window, now, global, fallback).await?);
            start = self.slots.next(start);
        }
        Ok(views)
    }

    async fn view(
        &self,
        window: &SlotWindow,
        now: DateTime<Utc>,
        global: i64,
        fallback: MemberLoad,
    ) -> Result<SlotView, StoreError> {
        let snapshot = self
            .retry
            .run("read", || self.store.read(window.id))
            .await?;

        let (load, load_source, order_ids) = if snapshot.load > 0 {
            (snapshot.load, LoadSource::Counter, snapshot.order_ids)
        } else if fallback.orders.is_empty() {
            (0, LoadSource::Empty, Vec::new())
        } else {
            tracing::debug!(
                slot_id = %window.id,
                members = fallback.orders.len(),
                "counter empty, using membership sum"
            );
            (fallback.amount, LoadSource::Membership, fallback.orders)
        };

        let capacity_override = snapshot.capacity_override.filter(|v| *v > 0);
        let max_capacity = capacity_override.unwrap_or(global);
        let phase = if now < window.start {
            SlotPhase::Future
        } else if window.contains(now) {
            SlotPhase::Current
        } else {
            SlotPhase::Past
        };

        Ok(SlotView {
            slot_id: window.id,
            start: window.start,
            end: window.end,
            phase,
            load,
            load_source,
            max_capacity,
            capacity_overridden: capacity_override.is_some(),
            available: (max_capacity - load).max(0),
            disabled: snapshot.disabled,
            plan: snapshot.plan,
            order_ids,
        })
    }

    /// Reserved amounts of in-flight orders, grouped by slot.
    async fn member_loads(&self) -> Result<BTreeMap<SlotId, MemberLoad>, StoreError> {
        let pending = self
            .retry
            .run("pending_orders", || self.membership.pending_orders())
            .await?;
        let active = self
            .retry
            .run("active_orders", || self.membership.active_orders())
            .await?;
        let in_flight: BTreeSet<OrderId> = pending.into_iter().chain(active).collect();

        let mut by_slot: BTreeMap<SlotId, MemberLoad> = BTreeMap::new();
        for order_id in in_flight {
            let association = self
                .retry
                .run("association", || self.membership.association(&order_id))
                .await?;
            if let Some(association) = association {
                let entry = by_slot.entry(association.slot_id).or_default();
                entry.amount += association.price;
                entry.orders.push(order_id);
            }
        }
        Ok(by_slot)
    }
}
