//! In-memory capacity and membership store.
//!
//! All state sits behind one `parking_lot::Mutex`. Every trait method takes
//! the lock exactly once and never awaits while holding it, so each call is
//! an indivisible unit exactly like a server-side script against a shared
//! cache. Expiry is evaluated lazily against the injected [`Clock`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::core::{
    Association, CapacityStore, MembershipStore, OrderId, ReserveOutcome, Reservation,
    SlotControls, SlotId, SlotInfo, SlotPlan, SlotSnapshot, StoreError,
};
use crate::util::Clock;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    const fn new(value: T, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    fn live(&self, now: DateTime<Utc>) -> Option<&T> {
        (now < self.expires_at).then_some(&self.value)
    }
}

#[derive(Debug, Default)]
struct State {
    loads: HashMap<SlotId, Expiring<i64>>,
    info: HashMap<SlotId, Expiring<SlotInfo>>,
    members: HashMap<SlotId, Expiring<BTreeSet<OrderId>>>,
    disabled: HashMap<SlotId, DateTime<Utc>>,
    overrides: HashMap<SlotId, i64>,
    plans: HashMap<SlotId, Expiring<SlotPlan>>,
    associations: HashMap<OrderId, Expiring<Association>>,
    global_capacity: Option<i64>,
    /// Pending orders keyed to the instant they become visible.
    pending: BTreeMap<OrderId, DateTime<Utc>>,
    active: BTreeSet<OrderId>,
}

impl State {
    fn load(&self, slot: SlotId, now: DateTime<Utc>) -> i64 {
        self.loads
            .get(&slot)
            .and_then(|e| e.live(now))
            .copied()
            .unwrap_or(0)
    }

    fn association(&self, order: &OrderId, now: DateTime<Utc>) -> Option<Association> {
        self.associations.get(order).and_then(|e| e.live(now)).copied()
    }

    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.loads.len()
            + self.info.len()
            + self.members.len()
            + self.disabled.len()
            + self.plans.len()
            + self.associations.len();
        self.loads.retain(|_, e| e.live(now).is_some());
        self.info.retain(|_, e| e.live(now).is_some());
        self.members.retain(|_, e| e.live(now).is_some());
        self.disabled.retain(|_, until| now < *until);
        self.plans.retain(|_, e| e.live(now).is_some());
        self.associations.retain(|_, e| e.live(now).is_some());
        let after = self.loads.len()
            + self.info.len()
            + self.members.len()
            + self.disabled.len()
            + self.plans.len()
            + self.associations.len();
        before - after
    }
}

/// Process-local store implementing [`CapacityStore`] and [`MembershipStore`].
pub struct InMemoryStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    injected_failures: AtomicU32,
}

impl InMemoryStore {
    /// Create an empty store retaining slot state for `ttl` past each slot.
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            ttl,
            injected_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn inject_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.state.lock().purge(now)
    }

    /// Wipe slot counters, metadata and membership, keeping only the
    /// pending/active sets and the global capacity.
    ///
    /// Models a cache that lost its volatile keys while the durable sets
    /// survived; used to exercise the registry's fallback path.
    pub fn drop_counters(&self) {
        let mut state = self.state.lock();
        state.loads.clear();
        state.info.clear();
        state.members.clear();
    }

    fn fault(&self) -> Result<(), StoreError> {
        let took = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match took {
            Ok(_) => Err(StoreError::Unavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }

    /// Retention deadline for state tied to a slot ending at `slot_end`.
    fn retain_until(&self, now: DateTime<Utc>, slot_end: DateTime<Utc>) -> DateTime<Utc> {
        now.max(slot_end) + self.ttl
    }
}

#[async_trait]
impl CapacityStore for InMemoryStore {
    async fn try_reserve(&self, reservation: &Reservation) -> Result<ReserveOutcome, StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let slot = reservation.window.id;
        let mut state = self.state.lock();

        if let Some(existing) = state.association(&reservation.order_id, now) {
            return Ok(ReserveOutcome::AlreadyReserved {
                slot_id: existing.slot_id,
            });
        }

        let load = state.load(slot, now);
        let Some(new_load) = load
            .checked_add(reservation.amount)
            .filter(|total| *total <= reservation.max_capacity)
        else {
            return Ok(ReserveOutcome::Rejected { load });
        };
        let until = self.retain_until(now, reservation.window.end);
        state.loads.insert(slot, Expiring::new(new_load, until));

        if state.info.get(&slot).and_then(|e| e.live(now)).is_none() {
            let info = SlotInfo {
                start_time: reservation.window.start,
                end_time: reservation.window.end,
                max_capacity: reservation.max_capacity,
            };
            state.info.insert(slot, Expiring::new(info, until));
        }

        let members = state
            .members
            .entry(slot)
            .or_insert_with(|| Expiring::new(BTreeSet::new(), until));
        if members.live(now).is_none() {
            members.value.clear();
        }
        members.value.insert(reservation.order_id);
        members.expires_at = until;

        state.associations.insert(
            reservation.order_id,
            Expiring::new(
                Association {
                    slot_id: slot,
                    price: reservation.amount,
                },
                until,
            ),
        );

        Ok(ReserveOutcome::Accepted { load: new_load })
    }

    async fn release(&self, order_id: &OrderId) -> Result<Option<Association>, StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let mut state = self.state.lock();

        let Some(entry) = state.associations.remove(order_id) else {
            return Ok(None);
        };
        let Some(association) = entry.live(now).copied() else {
            return Ok(None);
        };

        if let Some(load) = state.loads.get_mut(&association.slot_id) {
            if load.live(now).is_some() {
                load.value = (load.value - association.price).max(0);
            }
        }
        if let Some(members) = state.members.get_mut(&association.slot_id) {
            members.value.remove(order_id);
        }
        Ok(Some(association))
    }

    async fn read(&self, slot_id: SlotId) -> Result<SlotSnapshot, StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let state = self.state.lock();
        Ok(SlotSnapshot {
            slot_id,
            load: state.load(slot_id, now),
            info: state.info.get(&slot_id).and_then(|e| e.live(now)).copied(),
            disabled: state.disabled.get(&slot_id).is_some_and(|until| now < *until),
            capacity_override: state.overrides.get(&slot_id).copied(),
            plan: state.plans.get(&slot_id).and_then(|e| e.live(now)).copied(),
            order_ids: state
                .members
                .get(&slot_id)
                .and_then(|e| e.live(now))
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        })
    }

    async fn slot_controls(&self, slot_id: SlotId) -> Result<SlotControls, StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let state = self.state.lock();
        Ok(SlotControls {
            disabled: state.disabled.get(&slot_id).is_some_and(|until| now < *until),
            capacity_override: state.overrides.get(&slot_id).copied(),
        })
    }

    async fn global_capacity(&self) -> Result<Option<i64>, StoreError> {
        self.fault()?;
        Ok(self.state.lock().global_capacity)
    }

    async fn set_global_capacity(&self, value: i64) -> Result<(), StoreError> {
        self.fault()?;
        self.state.lock().global_capacity = Some(value);
        Ok(())
    }

    async fn set_slot_disabled(
        &self,
        slot_id: SlotId,
        disabled: bool,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        if disabled {
            state.disabled.insert(slot_id, now + ttl);
        } else {
            state.disabled.remove(&slot_id);
        }
        Ok(())
    }

    async fn set_slot_capacity(
        &self,
        slot_id: SlotId,
        value: Option<i64>,
    ) -> Result<(), StoreError> {
        self.fault()?;
        let mut state = self.state.lock();
        match value {
            Some(v) => state.overrides.insert(slot_id, v),
            None => state.overrides.remove(&slot_id),
        };
        Ok(())
    }

    async fn set_slot_plan(&self, slot_id: SlotId, plan: SlotPlan) -> Result<(), StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let until = self.retain_for_slot(now, slot_id);
        self.state
            .lock()
            .plans
            .insert(slot_id, Expiring::new(plan, until));
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn association(&self, order_id: &OrderId) -> Result<Option<Association>, StoreError> {
        self.fault()?;
        let now = self.clock.now();
        Ok(self.state.lock().association(order_id, now))
    }

    async fn restore_association(
        &self,
        order_id: &OrderId,
        association: Association,
        slot_end: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.fault()?;
        let now = self.clock.now();
        let until = self.retain_until(now, slot_end);
        self.state
            .lock()
            .associations
            .insert(*order_id, Expiring::new(association, until));
        Ok(())
    }

    async fn mark_pending(
        &self,
        order_id: &OrderId,
        visible_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.fault()?;
        let mut state = self.state.lock();
        state.active.remove(order_id);
        state.pending.insert(*order_id, visible_at);
        Ok(())
    }

    async fn mark_active(&self, order_id: &OrderId) -> Result<(), StoreError> {
        self.fault()?;
        let mut state = self.state.lock();
        state.pending.remove(order_id);
        state.active.insert(*order_id);
        Ok(())
    }

    async fn clear_membership(&self, order_id: &OrderId) -> Result<(), StoreError> {
        self.fault()?;
        let mut state = self.state.lock();
        state.pending.remove(order_id);
        state.active.remove(order_id);
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>, StoreError> {
        self.fault()?;
        let mut state = self.state.lock();
        let due: Vec<OrderId> = state
            .pending
            .iter()
            .filter(|(_, visible_at)| **visible_at <= now)
            .map(|(order, _)| *order)
            .collect();
        for order in &due {
            state.pending.remove(order);
            state.active.insert(*order);
        }
        Ok(due)
    }

    async fn pending_orders(&self) -> Result<Vec<OrderId>, StoreError> {
        self.fault()?;
        Ok(self.state.lock().pending.keys().copied().collect())
    }

    async fn active_orders(&self) -> Result<Vec<OrderId>, StoreError> {
        self.fault()?;
        Ok(self.state.lock().active.iter().copied().collect())
    }
}
