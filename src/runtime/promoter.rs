//! Background promotion of pending orders into `active`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::OrderLifecycle;
use crate::util::Clock;

/// Periodically moves orders whose visibility time has arrived into `active`.
pub struct VisibilityPromoter {
    lifecycle: OrderLifecycle,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl VisibilityPromoter {
    /// Create a promoter ticking every `interval`.
    pub fn new(lifecycle: OrderLifecycle, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            lifecycle,
            clock,
            interval,
        }
    }

    /// Run one promotion pass. Returns how many orders became visible.
    pub async fn tick(&self) -> usize {
        match self.lifecycle.promote_due(self.clock.now()).await {
            Ok(promoted) => promoted.len(),
            Err(err) => {
                tracing::warn!(error = %err, "visibility promotion failed");
                0
            }
        }
    }

    /// Spawn the promoter on the current tokio runtime.
    pub fn spawn(self) -> PromoterHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("visibility promoter stopped");
        });
        PromoterHandle { shutdown, task }
    }
}

/// Handle on a running [`VisibilityPromoter`].
pub struct PromoterHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PromoterHandle {
    /// Ask the promoter to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "visibility promoter task failed");
        }
    }
}
