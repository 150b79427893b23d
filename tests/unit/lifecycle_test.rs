//! Tests for membership transitions and the visibility promoter

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kitchen_slots::core::{Admission, MembershipStore, OrderId, OrderLifecycle, RetryPolicy, SlotId};
use kitchen_slots::infra::InMemoryStore;
use kitchen_slots::runtime::VisibilityPromoter;
use kitchen_slots::util::ManualClock;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, hour, minute, 0).unwrap()
}

fn admission(visible_at: DateTime<Utc>) -> Admission {
    let start = at(13, 0);
    Admission {
        order_id: OrderId::new(),
        slot_id: SlotId(start.timestamp()),
        slot_start: start,
        slot_end: start + Duration::minutes(15),
        visible_at,
        reserved_value: 10,
        load_after: 10,
    }
}

fn setup() -> (Arc<ManualClock>, Arc<InMemoryStore>, OrderLifecycle) {
    let clock = Arc::new(ManualClock::new(at(12, 0)));
    let store = Arc::new(InMemoryStore::new(clock.clone(), Duration::hours(2)));
    let lifecycle = OrderLifecycle::new(store.clone(), RetryPolicy::default());
    (clock, store, lifecycle)
}

#[tokio::test]
async fn test_future_visibility_goes_pending() {
    let (_, store, lifecycle) = setup();
    let a = admission(at(12, 30));
    lifecycle.track_admitted(&a, at(12, 0)).await.unwrap();

    assert_eq!(store.pending_orders().await.unwrap(), vec![a.order_id]);
    assert!(store.active_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_due_visibility_goes_active() {
    let (_, store, lifecycle) = setup();
    let a = admission(at(12, 0));
    lifecycle.track_admitted(&a, at(12, 0)).await.unwrap();

    assert!(store.pending_orders().await.unwrap().is_empty());
    assert_eq!(store.active_orders().await.unwrap(), vec![a.order_id]);
}

#[tokio::test]
async fn test_promote_and_complete() {
    let (_, store, lifecycle) = setup();
    let early = admission(at(12, 15));
    let late = admission(at(12, 45));
    lifecycle.track_admitted(&early, at(12, 0)).await.unwrap();
    lifecycle.track_admitted(&late, at(12, 0)).await.unwrap();

    let promoted = lifecycle.promote_due(at(12, 20)).await.unwrap();
    assert_eq!(promoted, vec![early.order_id]);
    assert_eq!(store.pending_orders().await.unwrap(), vec![late.order_id]);

    lifecycle.complete(&early.order_id).await.unwrap();
    lifecycle.complete(&late.order_id).await.unwrap();
    assert!(store.pending_orders().await.unwrap().is_empty());
    assert!(store.active_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_promoter_tick_uses_clock() {
    let (clock, store, lifecycle) = setup();
    let a = admission(at(12, 30));
    lifecycle.track_admitted(&a, at(12, 0)).await.unwrap();

    let promoter = VisibilityPromoter::new(lifecycle, clock.clone(), StdDuration::from_secs(1));
    assert_eq!(promoter.tick().await, 0);
    clock.set(at(12, 30));
    assert_eq!(promoter.tick().await, 1);
    assert_eq!(store.active_orders().await.unwrap(), vec![a.order_id]);
}

#[tokio::test]
async fn test_promoter_tick_survives_store_failure() {
    let (clock, store, _) = setup();
    let fast = RetryPolicy {
        retries: 0,
        ..RetryPolicy::default()
    };
    let lifecycle = OrderLifecycle::new(store.clone(), fast);
    let promoter = VisibilityPromoter::new(lifecycle, clock, StdDuration::from_secs(1));
    store.inject_failures(1);
    assert_eq!(promoter.tick().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_promoter_runs_until_shutdown() {
    let (clock, store, lifecycle) = setup();
    let a = admission(at(12, 0));
    lifecycle.track_admitted(&a, at(11, 0)).await.unwrap();
    assert_eq!(store.pending_orders().await.unwrap().len(), 1);

    let handle =
        VisibilityPromoter::new(lifecycle, clock, StdDuration::from_millis(100)).spawn();
    tokio::time::sleep(StdDuration::from_millis(250)).await;
    handle.shutdown().await;

    assert_eq!(store.active_orders().await.unwrap(), vec![a.order_id]);
}
