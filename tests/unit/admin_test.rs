//! Tests for administrative slot controls

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use kitchen_slots::core::{
    AdminError, CapacityConfig, CapacityStore, InMemoryAuditSink, RetryPolicy, SlotAdmin,
    SlotClock, SlotId, SlotPlan,
};
use kitchen_slots::infra::InMemoryStore;
use kitchen_slots::util::ManualClock;

fn setup() -> (Arc<ManualClock>, Arc<InMemoryStore>, SlotAdmin, InMemoryAuditSink) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(InMemoryStore::new(clock.clone(), Duration::hours(2)));
    let capacity = CapacityConfig::new(store.clone(), 1_000, RetryPolicy::default());
    let sink = InMemoryAuditSink::new(16);
    let admin = SlotAdmin::new(
        SlotClock::default(),
        store.clone(),
        capacity,
        Duration::hours(24),
        RetryPolicy::default(),
    )
    .with_audit(Arc::new(sink.clone()));
    (clock, store, admin, sink)
}

fn noon_slot() -> SlotId {
    SlotId(Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap().timestamp())
}

#[tokio::test]
async fn test_disable_and_enable() {
    let (_, store, admin, _) = setup();
    admin.disable(noon_slot()).await.unwrap();
    assert!(store.slot_controls(noon_slot()).await.unwrap().disabled);

    admin.enable(noon_slot()).await.unwrap();
    assert!(!store.slot_controls(noon_slot()).await.unwrap().disabled);
}

#[tokio::test]
async fn test_disabled_flag_expires() {
    let (clock, store, admin, _) = setup();
    admin.disable(noon_slot()).await.unwrap();
    clock.advance(Duration::hours(25));
    assert!(!store.slot_controls(noon_slot()).await.unwrap().disabled);
}

#[tokio::test]
async fn test_unaligned_slot_rejected() {
    let (_, _, admin, _) = setup();
    let unaligned = SlotId(noon_slot().0 + 60);
    assert_eq!(
        admin.disable(unaligned).await,
        Err(AdminError::InvalidSlot(unaligned))
    );
}

#[tokio::test]
async fn test_capacity_override_lifecycle() {
    let (_, store, admin, sink) = setup();
    assert_eq!(
        admin.override_capacity(noon_slot(), 0).await,
        Err(AdminError::InvalidCapacity(0))
    );

    admin.override_capacity(noon_slot(), 250).await.unwrap();
    let controls = store.slot_controls(noon_slot()).await.unwrap();
    assert_eq!(controls.capacity_override, Some(250));

    admin.clear_capacity_override(noon_slot()).await.unwrap();
    let controls = store.slot_controls(noon_slot()).await.unwrap();
    assert_eq!(controls.capacity_override, None);
    assert_eq!(sink.events_for("admin").len(), 2);
}

#[tokio::test]
async fn test_negative_plan_rejected() {
    let (_, store, admin, _) = setup();
    let bad = SlotPlan {
        delivery: -1,
        pickup: 10,
    };
    assert!(matches!(
        admin.set_plan(noon_slot(), bad).await,
        Err(AdminError::InvalidPlan(_))
    ));
    assert!(store.read(noon_slot()).await.unwrap().plan.is_none());
}

#[tokio::test]
async fn test_global_capacity_update() {
    let (_, store, admin, _) = setup();
    assert!(matches!(
        admin.update_global_capacity(-5).await,
        Err(AdminError::InvalidCapacity(-5))
    ));
    admin.update_global_capacity(750).await.unwrap();
    assert_eq!(store.global_capacity().await.unwrap(), Some(750));
}
