//! Slot admission: the forward search for a slot with room for an order.
//!
//! The controller never decides on the basis of a read. Whether an order
//! fits is answered by [`CapacityStore::try_reserve`] alone, so any number
//! of controllers may run against one store without overbooking a slot.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::config::{BusinessHours, KitchenConfig};
use crate::core::audit;
use crate::core::{
    Admission, AdmissionError, AuditSink, CapacityConfig, CapacityStore, MembershipStore,
    OrderId, OrderLifecycle, Reservation, ReserveOutcome, RetryPolicy, SlotClock, SlotId,
    SlotWindow, StoreError,
};
use crate::util::Clock;

/// Result of trying one candidate slot.
#[derive(Debug)]
enum SlotAttempt {
    /// Capacity reserved.
    Reserved { load: i64 },
    /// Not enough room left.
    Full { load: i64, capacity: i64 },
    /// Slot manually closed.
    Disabled,
    /// The order already holds a reservation elsewhere.
    Duplicate(SlotId),
    /// An earlier attempt of this search committed before its response was lost.
    Recovered(SlotId),
    /// The store kept failing for this slot.
    Failed(StoreError),
}

/// Assigns orders to the earliest slot that can take them.
#[derive(Clone)]
pub struct AdmissionController {
    slots: SlotClock,
    hours: BusinessHours,
    prep_buffer: Duration,
    lead: Duration,
    max_attempts: u32,
    failure_budget: u32,
    capacity: CapacityConfig,
    store: Arc<dyn CapacityStore>,
    lifecycle: OrderLifecycle,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl AdmissionController {
    /// Build a controller from validated configuration.
    pub fn new(
        cfg: &KitchenConfig,
        store: Arc<dyn CapacityStore>,
        membership: Arc<dyn MembershipStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry = RetryPolicy::from_config(cfg);
        Self {
            slots: SlotClock::new(cfg.slot_duration()),
            hours: cfg.hours,
            prep_buffer: cfg.prep_buffer(),
            lead: cfg.visibility_lead(),
            max_attempts: cfg.max_attempts,
            failure_budget: cfg.store_failure_budget.max(1),
            capacity: CapacityConfig::new(Arc::clone(&store), cfg.default_max_capacity, retry),
            store,
            lifecycle: OrderLifecycle::new(membership, retry),
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

    /// Replace the retry policy, e.g. to shorten backoff in tests.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.capacity = self.capacity.clone().with_retry(retry);
        self
    }

    /// Slot quantizer used by this controller.
    pub const fn slot_clock(&self) -> &SlotClock {
        &self.slots
    }

    /// Reserve capacity for an order in the earliest slot that can take it.
    ///
    /// # Errors
    ///
    /// * [`AdmissionError::InvalidOrder`] when `order_value` is not positive.
    /// * [`AdmissionError::KitchenClosed`] when no business-hours slot is
    ///   reachable from now.
    /// * [`AdmissionError::FullyBooked`] when every remaining slot today
    ///   refused the order.
    /// * [`AdmissionError::StoreUnavailable`] when store failures prevented
    ///   a conclusive answer.
    /// * [`AdmissionError::AlreadyAdmitted`] when the order holds a
    ///   reservation already.
    pub async fn admit(
        &self,
        order_id: OrderId,
        order_value: i64,
        item_count: u32,
    ) -> Result<Admission, AdmissionError> {
        if order_value <= 0 {
            return Err(self.reject(
                order_id,
                AdmissionError::InvalidOrder(format!(
                    "order value must be positive, got {order_value}"
                )),
            ));
        }

        let capacity = match self.capacity.current().await {
            Ok(capacity) => capacity,
            Err(err) => return Err(self.reject(order_id, AdmissionError::StoreUnavailable(err))),
        };
        let now = self.clock.now();
        let trading_day = now.date_naive();
        let first = self.first_candidate(now);

        tracing::debug!(
            order_id = %order_id,
            value = order_value,
            items = item_count,
            capacity,
            first_slot = %self.slots.id(first),
            "searching for slot"
        );

        let mut start = first;
        let mut evaluated = false;
        let mut failed_slots = 0_u32;
        let mut last_error: Option<StoreError> = None;
        let mut interrupted = false;

        for _ in 0..self.max_attempts {
            let window = self.slots.window(start);
            if !self.in_hours(&window, trading_day) {
                break;
            }
            evaluated = true;

            match self
                .attempt(&window, order_id, order_value, capacity, &mut interrupted)
                .await
            {
                SlotAttempt::Reserved { load } => {
                    return Ok(self.accept(order_id, order_value, &window, load, now).await);
                }
                SlotAttempt::Full { load, capacity } => {
                    tracing::debug!(
                        order_id = %order_id,
                        slot_id = %window.id,
                        load,
                        capacity,
                        "slot full, advancing"
                    );
                }
                SlotAttempt::Disabled => {
                    tracing::debug!(slot_id = %window.id, "slot disabled, skipping");
                }
                SlotAttempt::Duplicate(slot_id) => {
                    return Err(self.reject(order_id, AdmissionError::AlreadyAdmitted(slot_id)));
                }
                SlotAttempt::Recovered(slot_id) => {
                    let Some(committed) = self.slots.window_of(slot_id) else {
                        return Err(
                            self.reject(order_id, AdmissionError::AlreadyAdmitted(slot_id))
                        );
                    };
                    tracing::info!(
                        order_id = %order_id,
                        slot_id = %slot_id,
                        "reservation from interrupted attempt found"
                    );
                    let load = self
                        .retry
                        .once(self.store.read(slot_id))
                        .await
                        .map_or(order_value, |snapshot| snapshot.load);
                    return Ok(self.accept(order_id, order_value, &committed, load, now).await);
                }
                SlotAttempt::Failed(err) => {
                    failed_slots += 1;
                    tracing::warn!(
                        order_id = %order_id,
                        slot_id = %window.id,
                        failed_slots,
                        error = %err,
                        "giving up on slot after store failures"
                    );
                    last_error = Some(err);
                    if failed_slots >= self.failure_budget {
                        break;
                    }
                }
            }
            start = self.slots.next(start);
        }

        let error = match (last_error, evaluated) {
            (Some(err), _) => AdmissionError::StoreUnavailable(err),
            (None, false) => AdmissionError::KitchenClosed,
            (None, true) => AdmissionError::FullyBooked,
        };
        Err(self.reject(order_id, error))
    }

    /// Visibility time for an order admitted at `now` into a slot at `slot_start`.
    pub fn visible_at(&self, slot_start: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        if slot_start - now >= self.lead {
            slot_start - self.lead
        } else {
            slot_start
        }
    }

    fn first_candidate(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut start = self.slots.start_of(now);
        if now >= start {
            start = self.slots.next(start);
        }
        // Earliest slot whose end leaves at least the prep buffer.
        let threshold = now + self.prep_buffer - self.slots.duration();
        let mut buffered = self.slots.start_of(threshold);
        if buffered < threshold {
            buffered = self.slots.next(buffered);
        }
        start.max(buffered)
    }

    fn in_hours(&self, window: &SlotWindow, trading_day: NaiveDate) -> bool {
        self.hours.admits(window, trading_day)
    }

    async fn attempt(
        &self,
        window: &SlotWindow,
        order_id: OrderId,
        amount: i64,
        global_capacity: i64,
        interrupted: &mut bool,
    ) -> SlotAttempt {
        let controls = match self
            .retry
            .run("slot_controls", || self.store.slot_controls(window.id))
            .await
        {
            Ok(controls) => controls,
            Err(err) => return SlotAttempt::Failed(err),
        };
        if controls.disabled {
            return SlotAttempt::Disabled;
        }
        let capacity = controls
            .capacity_override
            .filter(|v| *v > 0)
            .unwrap_or(global_capacity);

        let reservation = Reservation {
            window: *window,
            amount,
            max_capacity: capacity,
            order_id,
        };

        let mut retries = 0;
        loop {
            match self.retry.once(self.store.try_reserve(&reservation)).await {
                Ok(ReserveOutcome::Accepted { load }) => return SlotAttempt::Reserved { load },
                Ok(ReserveOutcome::Rejected { load }) => return SlotAttempt::Full { load, capacity },
                // An earlier attempt, on this slot or a previous one, committed
                // before its response was lost.
                Ok(ReserveOutcome::AlreadyReserved { slot_id }) if *interrupted => {
                    return SlotAttempt::Recovered(slot_id);
                }
                Ok(ReserveOutcome::AlreadyReserved { slot_id }) => {
                    return SlotAttempt::Duplicate(slot_id);
                }
                Err(err) if err.is_transient() && retries < self.retry.retries => {
                    let delay = self.retry.backoff(retries);
                    tracing::debug!(
                        slot_id = %window.id,
                        attempt = retries,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "reserve failed, retrying same slot"
                    );
                    *interrupted = true;
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        *interrupted = true;
                    }
                    return SlotAttempt::Failed(err);
                }
            }
        }
    }

    async fn accept(
        &self,
        order_id: OrderId,
        amount: i64,
        window: &SlotWindow,
        load: i64,
        now: DateTime<Utc>,
    ) -> Admission {
        let admission = Admission {
            order_id,
            slot_id: window.id,
            slot_start: window.start,
            slot_end: window.end,
            visible_at: self.visible_at(window.start, now),
            reserved_value: amount,
            load_after: load,
        };
        tracing::info!(
            order_id = %order_id,
            slot_id = %window.id,
            slot_start = %window.start,
            visible_at = %admission.visible_at,
            load,
            "order admitted"
        );
        if let Err(err) = self.lifecycle.track_admitted(&admission, now).await {
            tracing::warn!(
                order_id = %order_id,
                error = %err,
                "admitted order not entered into membership sets"
            );
        }
        audit::record(
            self.audit.as_ref(),
            Some(order_id),
            Some(window.id),
            "admit",
            Some(format!("value={amount} load={load}")),
        );
        admission
    }

    fn reject(&self, order_id: OrderId, error: AdmissionError) -> AdmissionError {
        match &error {
            AdmissionError::StoreUnavailable(_) => {
                tracing::error!(order_id = %order_id, error = %error, "admission failed");
            }
            _ => tracing::info!(order_id = %order_id, reason = error.code(), "order not admitted"),
        }
        audit::record(
            self.audit.as_ref(),
            Some(order_id),
            None,
            "reject",
            Some(error.code().to_string()),
        );
        error
    }
}
