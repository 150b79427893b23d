//! Tests for API request/response models

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use kitchen_slots::builders::SchedulerBuilder;
use kitchen_slots::config::KitchenConfig;
use kitchen_slots::core::{AdmissionError, MembershipStore, OrderId, OrderStore, StoreError};
use kitchen_slots::infra::{InMemoryOrderStore, InMemoryStore};
use kitchen_slots::runtime::{AdmitRequest, ErrorResponse, admit_order, health, list_slots, release_order};
use kitchen_slots::util::ManualClock;

async fn scheduler_at(hour: u32) -> kitchen_slots::builders::Scheduler {
    let cfg = KitchenConfig::default();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 14, hour, 0, 0).unwrap(),
    ));
    let store = Arc::new(InMemoryStore::new(clock.clone(), cfg.state_ttl()));
    SchedulerBuilder::new(cfg, store, Arc::new(InMemoryOrderStore::new()), clock)
        .start()
        .await
        .unwrap()
}

#[test]
fn test_error_response_from_admission_error() {
    let resp = ErrorResponse::from(&AdmissionError::FullyBooked);
    assert_eq!(resp.code, "fully_booked");
    assert!(resp.retryable);
    assert_eq!(resp.message, "fully booked");
}

#[test]
fn test_admit_request_defaults_item_count() {
    let id = OrderId::new();
    let json = format!(r#"{{"order_id":"{id}","value":1200}}"#);
    let req: AdmitRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(req.order_id, id);
    assert_eq!(req.item_count, 0);
}

#[tokio::test]
async fn test_admit_and_release_round() {
    let scheduler = scheduler_at(12).await;
    let order_id = OrderId::new();
    let resp = admit_order(
        &scheduler,
        AdmitRequest {
            order_id,
            value: 300,
            item_count: 2,
        },
    )
    .await
    .unwrap();
    assert_eq!(resp.order_id, order_id);

    release_order(&scheduler, order_id).await.unwrap();
    // unknown orders release cleanly too
    release_order(&scheduler, OrderId::new()).await.unwrap();

    let slots = list_slots(&scheduler).await.unwrap();
    assert_eq!(slots.len(), 48);
    assert!(slots.iter().all(|s| s.load == 0));
}

#[tokio::test]
async fn test_closed_kitchen_maps_to_error_payload() {
    let scheduler = scheduler_at(6).await;
    let err = admit_order(
        &scheduler,
        AdmitRequest {
            order_id: OrderId::new(),
            value: 300,
            item_count: 2,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, "kitchen_closed");
}

#[tokio::test]
async fn test_health_reports_recovery() {
    let scheduler = scheduler_at(12).await;
    let h = health(&scheduler);
    assert!(h.ok);
    assert_eq!(h.recovered, Some(0));
}

#[tokio::test]
async fn test_api_admission_survives_restart() {
    let cfg = KitchenConfig::default();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(InMemoryStore::new(clock.clone(), cfg.state_ttl()));
    let orders = Arc::new(InMemoryOrderStore::new());
    let scheduler = SchedulerBuilder::new(cfg.clone(), store.clone(), orders.clone(), clock.clone())
        .start()
        .await
        .unwrap();

    let order_id = OrderId::new();
    let resp = admit_order(
        &scheduler,
        AdmitRequest {
            order_id,
            value: 300,
            item_count: 2,
        },
    )
    .await
    .unwrap();
    let persisted = orders.list_in_flight().await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].slot_id, Some(resp.slot_id));

    let restarted = SchedulerBuilder::new(cfg, store.clone(), orders, clock)
        .start()
        .await
        .unwrap();
    let report = restarted.last_recovery().unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(report.evicted, 0);

    let pending = store.pending_orders().await.unwrap();
    let active = store.active_orders().await.unwrap();
    assert!(pending.contains(&order_id) || active.contains(&order_id));
}

#[test]
fn test_error_response_from_wrapped_errors() {
    let admission = anyhow::Error::new(AdmissionError::FullyBooked);
    assert_eq!(ErrorResponse::from(&admission).code, "fully_booked");

    let store = anyhow::Error::new(StoreError::Timeout).context("failed to persist assignment");
    let resp = ErrorResponse::from(&store);
    assert_eq!(resp.code, "store_unavailable");
    assert!(resp.retryable);
    assert!(resp.message.contains("failed to persist assignment"));

    let other = ErrorResponse::from(&anyhow::anyhow!("boom"));
    assert_eq!(other.code, "internal");
    assert!(!other.retryable);
}
