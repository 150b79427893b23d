//! Audit sink implementations.
//!
//! Admission decisions, releases and recovery runs are recorded as
//! [`AuditEvent`]s when a sink is attached.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::{OrderId, SlotId};
use crate::util::clock::now_ms;

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related order, if the event concerns a single order.
    pub order_id: Option<OrderId>,
    /// Related slot, if any.
    pub slot_id: Option<SlotId>,
    /// Action taken (admit, reject, release, cancel, recover, admin).
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// scheduler records through another.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events whose action equals `action`.
    pub fn events_for(&self, action: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards every event to `tracing` under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "kitchen_slots::audit",
            event_id = %event.event_id,
            order_id = ?event.order_id,
            slot_id = ?event.slot_id,
            action = %event.action,
            payload = ?event.payload,
            "audit"
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    order_id: Option<OrderId>,
    slot_id: Option<SlotId>,
    action: impl Into<String>,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        order_id,
        slot_id,
        action: action.into(),
        created_at_ms: now_ms(),
        payload,
    }
}

/// Record on an optional sink.
pub(crate) fn record(
    sink: Option<&Arc<dyn AuditSink>>,
    order_id: Option<OrderId>,
    slot_id: Option<SlotId>,
    action: &str,
    payload: Option<String>,
) {
    if let Some(sink) = sink {
        sink.record(build_audit_event(order_id, slot_id, action, payload));
    }
}
