//! Tests for audit sink

use kitchen_slots::core::{AuditSink, InMemoryAuditSink, OrderId, SlotId, build_audit_event};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let order = OrderId::new();

    sink.record(build_audit_event(
        Some(order),
        Some(SlotId(1_800_000_000)),
        "admit",
        Some("value=40".to_string()),
    ));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].order_id, Some(order));
    assert_eq!(events[0].slot_id, Some(SlotId(1_800_000_000)));
    assert_eq!(events[0].action, "admit");
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(None, None, "admit", Some("1".into())));
    sink.record(build_audit_event(None, None, "admit", Some("2".into())));
    sink.record(build_audit_event(None, None, "release", Some("3".into())));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].payload.as_deref(), Some("2")); // First one popped
    assert_eq!(events[1].payload.as_deref(), Some("3"));
}

#[test]
fn test_events_for_filters_by_action() {
    let sink = InMemoryAuditSink::new(8);
    sink.record(build_audit_event(None, None, "admit", None));
    sink.record(build_audit_event(None, None, "reject", None));
    sink.record(build_audit_event(None, None, "admit", None));

    assert_eq!(sink.events_for("admit").len(), 2);
    assert_eq!(sink.events_for("reject").len(), 1);
    assert!(sink.events_for("cancel").is_empty());
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(4);
    let handle = sink.clone();
    sink.record(build_audit_event(None, None, "admin", None));
    assert_eq!(handle.events().len(), 1);
}

#[test]
fn test_build_audit_event() {
    let a = build_audit_event(None, None, "recover", Some("{}".to_string()));
    let b = build_audit_event(None, None, "recover", None);

    assert_ne!(a.event_id, b.event_id);
    assert_eq!(a.action, "recover");
    assert!(a.created_at_ms > 0);
}
