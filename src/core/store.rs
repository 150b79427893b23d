//! Store abstractions for slot capacity and order membership.
//!
//! Every method on these traits is one indivisible unit against the backing
//! store. Callers never combine several calls to make an admission decision;
//! the check-and-update lives entirely inside [`CapacityStore::try_reserve`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Admission, InFlightOrder, OrderId, SlotId, SlotWindow, StoreError};

/// Request to reserve capacity for one order in one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Target slot.
    pub window: SlotWindow,
    /// Amount to add to the slot load.
    pub amount: i64,
    /// Ceiling the resulting load must not exceed.
    pub max_capacity: i64,
    /// Order the capacity is reserved for.
    pub order_id: OrderId,
}

/// Result of [`CapacityStore::try_reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Capacity reserved; `load` is the new slot load.
    Accepted {
        /// Load after the increment.
        load: i64,
    },
    /// Not enough room; nothing was written. `load` is the current load.
    Rejected {
        /// Load observed by the check.
        load: i64,
    },
    /// The order already holds a reservation; nothing was written.
    AlreadyReserved {
        /// Slot the existing reservation belongs to.
        slot_id: SlotId,
    },
}

/// Reverse index entry: which slot an order is counted in, and for how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Slot the order's value was added to.
    pub slot_id: SlotId,
    /// Exact amount added; the only amount ever subtracted on release.
    pub price: i64,
}

/// Slot metadata recorded on first reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    /// Slot start.
    pub start_time: DateTime<Utc>,
    /// Slot end.
    pub end_time: DateTime<Utc>,
    /// Capacity in force when the slot was first used.
    pub max_capacity: i64,
}

/// Advisory split of a slot's capacity, persisted for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotPlan {
    /// Capacity earmarked for delivery orders.
    pub delivery: i64,
    /// Capacity earmarked for pickup orders.
    pub pickup: i64,
}

/// Per-slot administrative controls consulted before reserving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotControls {
    /// Slot manually closed for new orders.
    pub disabled: bool,
    /// Capacity replacing the global value for this slot.
    pub capacity_override: Option<i64>,
}

/// Raw, eventually consistent view of one slot's stored state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Slot identifier.
    pub slot_id: SlotId,
    /// Load counter; zero when absent or expired.
    pub load: i64,
    /// Metadata written on first reservation.
    pub info: Option<SlotInfo>,
    /// Disabled flag.
    pub disabled: bool,
    /// Per-slot capacity override.
    pub capacity_override: Option<i64>,
    /// Advisory plan.
    pub plan: Option<SlotPlan>,
    /// Orders counted in the load.
    pub order_ids: Vec<OrderId>,
}

/// Atomic per-slot capacity primitives.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    /// Reserve `amount` in the slot if the result stays within `max_capacity`.
    ///
    /// On acceptance the load increment, slot info, slot membership and the
    /// reverse association are written together; on any other outcome
    /// nothing is written.
    async fn try_reserve(&self, reservation: &Reservation) -> Result<ReserveOutcome, StoreError>;

    /// Undo an order's reservation. Unknown orders are a no-op.
    ///
    /// Returns the association that was removed, if any.
    async fn release(&self, order_id: &OrderId) -> Result<Option<Association>, StoreError>;

    /// Observational read of one slot. Never used to gate admission.
    async fn read(&self, slot_id: SlotId) -> Result<SlotSnapshot, StoreError>;

    /// Disabled flag and capacity override for a slot.
    async fn slot_controls(&self, slot_id: SlotId) -> Result<SlotControls, StoreError>;

    /// Process-wide max capacity, if one has been stored.
    async fn global_capacity(&self) -> Result<Option<i64>, StoreError>;

    /// Store the process-wide max capacity.
    async fn set_global_capacity(&self, value: i64) -> Result<(), StoreError>;

    /// Set or clear the disabled flag; a set flag expires after `ttl`.
    async fn set_slot_disabled(
        &self,
        slot_id: SlotId,
        disabled: bool,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Set or clear a per-slot capacity override.
    async fn set_slot_capacity(&self, slot_id: SlotId, value: Option<i64>)
        -> Result<(), StoreError>;

    /// Store the advisory delivery/pickup plan.
    async fn set_slot_plan(&self, slot_id: SlotId, plan: SlotPlan) -> Result<(), StoreError>;
}

/// Pending/active membership sets and the order→slot reverse index.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Reverse association for an order, if present.
    async fn association(&self, order_id: &OrderId) -> Result<Option<Association>, StoreError>;

    /// Re-create an order's reverse association without touching slot load.
    ///
    /// Retention runs from `slot_end`, as for a fresh reservation.
    async fn restore_association(
        &self,
        order_id: &OrderId,
        association: Association,
        slot_end: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Put the order in `pending` until `visible_at`, removing it from `active`.
    async fn mark_pending(
        &self,
        order_id: &OrderId,
        visible_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Move the order into `active`, removing it from `pending`.
    async fn mark_active(&self, order_id: &OrderId) -> Result<(), StoreError>;

    /// Remove the order from both sets.
    async fn clear_membership(&self, order_id: &OrderId) -> Result<(), StoreError>;

    /// Move every pending order visible at or before `now` into `active`.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>, StoreError>;

    /// Members of `pending`.
    async fn pending_orders(&self) -> Result<Vec<OrderId>, StoreError>;

    /// Members of `active`.
    async fn active_orders(&self) -> Result<Vec<OrderId>, StoreError>;
}

/// Durable order storage as seen by the scheduler.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Every order whose status is not terminal.
    async fn list_in_flight(&self) -> Result<Vec<InFlightOrder>, StoreError>;

    /// Persist the slot assignment produced by a successful admission.
    async fn persist_assignment(&self, admission: &Admission) -> Result<(), StoreError>;
}
