//! Wiring of every scheduling component from one validated configuration.

use std::sync::Arc;

use anyhow::{Context, anyhow};

use crate::config::KitchenConfig;
use crate::core::{
    Admission, AdmissionController, AppResult, AuditSink, BootstrapRecovery, CapacityConfig,
    CapacityStore, MembershipStore, OrderId, OrderLifecycle, OrderStore, RecoveryReport,
    ReleaseCoordinator, RetryPolicy, SlotAdmin, SlotClock, SlotRegistry,
};
use crate::runtime::{PromoterHandle, VisibilityPromoter};
use crate::util::Clock;

/// Collects the stores and options a [`Scheduler`] is built from.
pub struct SchedulerBuilder<S> {
    config: KitchenConfig,
    store: Arc<S>,
    orders: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
    retry: Option<RetryPolicy>,
}

impl<S> SchedulerBuilder<S>
where
    S: CapacityStore + MembershipStore + 'static,
{
    /// Start a builder. `store` serves both capacity and membership state.
    pub fn new(
        config: KitchenConfig,
        store: Arc<S>,
        orders: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            orders,
            clock,
            audit: None,
            retry: None,
        }
    }

    /// Record decisions on `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Override the retry policy derived from configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Assemble the components without touching the store.
    pub fn build(self) -> AppResult<Scheduler> {
        self.config
            .validate()
            .map_err(|e| anyhow!("config invalid: {e}"))?;

        let cfg = self.config;
        let retry = self.retry.unwrap_or_else(|| RetryPolicy::from_config(&cfg));
        let slots = SlotClock::new(cfg.slot_duration());
        let capacity_store: Arc<dyn CapacityStore> = self.store.clone();
        let membership: Arc<dyn MembershipStore> = self.store;

        let capacity =
            CapacityConfig::new(Arc::clone(&capacity_store), cfg.default_max_capacity, retry);
        let lifecycle = OrderLifecycle::new(Arc::clone(&membership), retry);

        let mut admission = AdmissionController::new(
            &cfg,
            Arc::clone(&capacity_store),
            Arc::clone(&membership),
            Arc::clone(&self.clock),
        )
        .with_retry(retry);
        let mut release =
            ReleaseCoordinator::new(Arc::clone(&capacity_store), lifecycle.clone(), retry);
        let registry = SlotRegistry::new(
            slots,
            cfg.hours,
            Arc::clone(&capacity_store),
            Arc::clone(&membership),
            capacity.clone(),
            Arc::clone(&self.clock),
            retry,
        );
        let mut admin = SlotAdmin::new(
            slots,
            capacity_store,
            capacity.clone(),
            cfg.disabled_ttl(),
            retry,
        );
        let mut recovery = BootstrapRecovery::new(
            Arc::clone(&self.orders),
            membership,
            slots,
            cfg.visibility_lead(),
            Arc::clone(&self.clock),
            retry,
        );

        if let Some(audit) = self.audit {
            admission = admission.with_audit(Arc::clone(&audit));
            release = release.with_audit(Arc::clone(&audit));
            admin = admin.with_audit(Arc::clone(&audit));
            recovery = recovery.with_audit(audit);
        }

        Ok(Scheduler {
            config: cfg,
            admission,
            release,
            registry,
            admin,
            lifecycle,
            capacity,
            recovery,
            orders: self.orders,
            clock: self.clock,
            last_recovery: None,
        })
    }

    /// Build, seed the global capacity and run recovery.
    ///
    /// The returned scheduler has finished recovery, so it is safe to start
    /// serving admissions from it.
    pub async fn start(self) -> AppResult<Scheduler> {
        let mut scheduler = self.build()?;
        let capacity = scheduler
            .capacity
            .initialize()
            .await
            .context("failed to initialize global capacity")?;
        let report = scheduler
            .recovery
            .restore()
            .await
            .context("startup recovery failed")?;
        tracing::info!(
            capacity,
            restored = report.restored,
            "slot scheduler started"
        );
        scheduler.last_recovery = Some(report);
        Ok(scheduler)
    }
}

/// Every scheduling component, sharing one set of stores.
#[derive(Clone)]
pub struct Scheduler {
    config: KitchenConfig,
    admission: AdmissionController,
    release: ReleaseCoordinator,
    registry: SlotRegistry,
    admin: SlotAdmin,
    lifecycle: OrderLifecycle,
    capacity: CapacityConfig,
    recovery: BootstrapRecovery,
    orders: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    last_recovery: Option<RecoveryReport>,
}

impl Scheduler {
    /// Configuration the scheduler was built from.
    pub const fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Admission controller.
    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Release coordinator.
    pub const fn release(&self) -> &ReleaseCoordinator {
        &self.release
    }

    /// Day view of slot load.
    pub const fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    /// Administrative slot controls.
    pub const fn admin(&self) -> &SlotAdmin {
        &self.admin
    }

    /// Membership transitions.
    pub const fn lifecycle(&self) -> &OrderLifecycle {
        &self.lifecycle
    }

    /// Live global capacity.
    pub const fn capacity(&self) -> &CapacityConfig {
        &self.capacity
    }

    /// Recovery pass, for re-running reconciliation on demand.
    pub const fn recovery(&self) -> &BootstrapRecovery {
        &self.recovery
    }

    /// Report of the recovery run performed by [`SchedulerBuilder::start`].
    pub const fn last_recovery(&self) -> Option<RecoveryReport> {
        self.last_recovery
    }

    /// Admit an order and persist its assignment durably.
    ///
    /// When persisting fails the reservation is released again, so an
    /// assignment that never reached durable storage does not hold capacity.
    pub async fn schedule_order(
        &self,
        order_id: OrderId,
        order_value: i64,
        item_count: u32,
    ) -> AppResult<Admission> {
        let admission = self
            .admission
            .admit(order_id, order_value, item_count)
            .await?;
        if let Err(err) = self.orders.persist_assignment(&admission).await {
            tracing::error!(order_id = %order_id, error = %err, "persisting assignment failed, releasing");
            self.release
                .cancel(&order_id)
                .await
                .with_context(|| format!("failed to release unpersisted order {order_id}"))?;
            return Err(anyhow::Error::new(err)
                .context(format!("failed to persist assignment of {order_id}")));
        }
        Ok(admission)
    }

    /// Start the background promoter of pending orders.
    pub fn spawn_promoter(&self) -> PromoterHandle {
        VisibilityPromoter::new(
            self.lifecycle.clone(),
            Arc::clone(&self.clock),
            self.config.promote_interval(),
        )
        .spawn()
    }
}
