//! Tests for the release coordinator

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kitchen_slots::core::{
    CapacityStore, InMemoryAuditSink, MembershipStore, OrderId, OrderLifecycle,
    ReleaseCoordinator, Reservation, RetryPolicy, SlotClock,
};
use kitchen_slots::infra::InMemoryStore;
use kitchen_slots::util::ManualClock;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, hour, minute, 0).unwrap()
}

fn setup() -> (Arc<InMemoryStore>, ReleaseCoordinator, InMemoryAuditSink) {
    let clock = Arc::new(ManualClock::new(at(12, 0)));
    let store = Arc::new(InMemoryStore::new(clock, Duration::hours(2)));
    let sink = InMemoryAuditSink::new(16);
    let coordinator = ReleaseCoordinator::new(
        store.clone(),
        OrderLifecycle::new(store.clone(), RetryPolicy::default()),
        RetryPolicy::default(),
    )
    .with_audit(Arc::new(sink.clone()));
    (store, coordinator, sink)
}

async fn reserve(store: &InMemoryStore, order_id: OrderId, amount: i64) {
    store
        .try_reserve(&Reservation {
            window: SlotClock::default().window(at(12, 30)),
            amount,
            max_capacity: 100,
            order_id,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let (store, coordinator, sink) = setup();
    let id = OrderId::new();
    reserve(&store, id, 30).await;

    coordinator.release(&id).await.unwrap();
    coordinator.release(&id).await.unwrap();

    let snapshot = store.read(SlotClock::default().id(at(12, 30))).await.unwrap();
    assert_eq!(snapshot.load, 0);
    assert!(snapshot.order_ids.is_empty());
    assert_eq!(sink.events_for("release").len(), 1);
}

#[tokio::test]
async fn test_release_of_unknown_order_is_noop() {
    let (store, coordinator, sink) = setup();
    let kept = OrderId::new();
    reserve(&store, kept, 30).await;

    coordinator.release(&OrderId::new()).await.unwrap();

    let snapshot = store.read(SlotClock::default().id(at(12, 30))).await.unwrap();
    assert_eq!(snapshot.load, 30);
    assert!(sink.events_for("release").is_empty());
}

#[tokio::test]
async fn test_release_subtracts_recorded_amount() {
    let (store, coordinator, _) = setup();
    let a = OrderId::new();
    let b = OrderId::new();
    reserve(&store, a, 30).await;
    reserve(&store, b, 45).await;

    coordinator.release(&a).await.unwrap();

    let snapshot = store.read(SlotClock::default().id(at(12, 30))).await.unwrap();
    assert_eq!(snapshot.load, 45);
    assert_eq!(snapshot.order_ids, vec![b]);
}

#[tokio::test]
async fn test_cancel_clears_membership() {
    let (store, coordinator, sink) = setup();
    let id = OrderId::new();
    reserve(&store, id, 30).await;
    store.mark_pending(&id, at(12, 0)).await.unwrap();

    coordinator.cancel(&id).await.unwrap();

    assert!(store.pending_orders().await.unwrap().is_empty());
    assert!(store.association(&id).await.unwrap().is_none());
    assert_eq!(sink.events_for("cancel").len(), 1);
}

#[tokio::test]
async fn test_released_capacity_is_reusable() {
    let (store, coordinator, _) = setup();
    let first = OrderId::new();
    reserve(&store, first, 100).await;
    coordinator.release(&first).await.unwrap();

    let second = OrderId::new();
    reserve(&store, second, 100).await;
    let snapshot = store.read(SlotClock::default().id(at(12, 30))).await.unwrap();
    assert_eq!(snapshot.load, 100);
}
