//! Administrative per-slot controls.

use std::sync::Arc;

use chrono::Duration;

use crate::core::audit;
use crate::core::{
    AdminError, AuditSink, CapacityConfig, CapacityStore, RetryPolicy, SlotClock, SlotId,
    SlotPlan,
};

/// Operator-facing mutations of slot state.
///
/// None of these touch a load counter; they only change what later
/// admissions are allowed to do.
#[derive(Clone)]
pub struct SlotAdmin {
    slots: SlotClock,
    store: Arc<dyn CapacityStore>,
    capacity: CapacityConfig,
    disabled_ttl: Duration,
    retry: RetryPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl SlotAdmin {
    /// Create the admin surface.
    pub fn new(
        slots: SlotClock,
        store: Arc<dyn CapacityStore>,
        capacity: CapacityConfig,
        disabled_ttl: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            slots,
            store,
            capacity,
            disabled_ttl,
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

    /// Close a slot for new orders until re-enabled or the flag expires.
    pub async fn disable(&self, slot_id: SlotId) -> Result<(), AdminError> {
        let slot_id = self.check(slot_id)?;
        self.retry
            .run("set_slot_disabled", || {
                self.store.set_slot_disabled(slot_id, true, self.disabled_ttl)
            })
            .await?;
        tracing::info!(slot_id = %slot_id, "slot disabled");
        self.record(slot_id, "disable".into());
        Ok(())
    }

    /// Re-open a disabled slot.
    pub async fn enable(&self, slot_id: SlotId) -> Result<(), AdminError> {
        let slot_id = self.check(slot_id)?;
        self.retry
            .run("set_slot_disabled", || {
                self.store.set_slot_disabled(slot_id, false, self.disabled_ttl)
            })
            .await?;
        tracing::info!(slot_id = %slot_id, "slot enabled");
        self.record(slot_id, "enable".into());
        Ok(())
    }

    /// Replace the global capacity for one slot.
    pub async fn override_capacity(&self, slot_id: SlotId, value: i64) -> Result<(), AdminError> {
        if value <= 0 {
            return Err(AdminError::InvalidCapacity(value));
        }
        let slot_id = self.check(slot_id)?;
        self.retry
            .run("set_slot_capacity", || {
                self.store.set_slot_capacity(slot_id, Some(value))
            })
            .await?;
        tracing::info!(slot_id = %slot_id, capacity = value, "slot capacity overridden");
        self.record(slot_id, format!("override_capacity={value}"));
        Ok(())
    }

    /// Drop a per-slot override; the global capacity applies again.
    pub async fn clear_capacity_override(&self, slot_id: SlotId) -> Result<(), AdminError> {
        let slot_id = self.check(slot_id)?;
        self.retry
            .run("set_slot_capacity", || self.store.set_slot_capacity(slot_id, None))
            .await?;
        tracing::info!(slot_id = %slot_id, "slot capacity override cleared");
        self.record(slot_id, "clear_capacity_override".into());
        Ok(())
    }

    /// Store the advisory delivery/pickup split. Never enforced.
    pub async fn set_plan(&self, slot_id: SlotId, plan: SlotPlan) -> Result<(), AdminError> {
        if plan.delivery < 0 || plan.pickup < 0 {
            return Err(AdminError::InvalidPlan(format!(
                "delivery ({}) and pickup ({}) must not be negative",
                plan.delivery, plan.pickup
            )));
        }
        let slot_id = self.check(slot_id)?;
        self.retry
            .run("set_slot_plan", || self.store.set_slot_plan(slot_id, plan))
            .await?;
        self.record(
            slot_id,
            format!("plan delivery={} pickup={}", plan.delivery, plan.pickup),
        );
        Ok(())
    }

    /// Change the process-wide capacity seen by every later admission.
    pub async fn update_global_capacity(&self, value: i64) -> Result<(), AdminError> {
        self.capacity.update(value).await?;
        audit::record(
            self.audit.as_ref(),
            None,
            None,
            "admin",
            Some(format!("global_capacity={value}")),
        );
        Ok(())
    }

    fn check(&self, slot_id: SlotId) -> Result<SlotId, AdminError> {
        match self.slots.window_of(slot_id) {
            Some(window) if window.id == slot_id => Ok(slot_id),
            _ => Err(AdminError::InvalidSlot(slot_id)),
        }
    }

    fn record(&self, slot_id: SlotId, payload: String) {
        audit::record(self.audit.as_ref(), None, Some(slot_id), "admin", Some(payload));
    }
}
