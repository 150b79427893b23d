//! Slot scheduling domain: time quantization, capacity accounting, admission,
//! release, reporting and recovery.

pub mod admin;
pub mod admission;
pub mod audit;
pub mod bootstrap;
pub mod capacity;
pub mod error;
pub mod lifecycle;
pub mod order;
pub mod registry;
pub mod release;
pub mod retry;
pub mod slot_clock;
pub mod store;

pub use admin::SlotAdmin;
pub use admission::AdmissionController;
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink, build_audit_event};
pub use bootstrap::{BootstrapRecovery, RecoveryReport};
pub use capacity::CapacityConfig;
pub use error::{AdminError, AdmissionError, AppResult, StoreError};
pub use lifecycle::OrderLifecycle;
pub use order::{Admission, InFlightOrder, OrderId, OrderStatus};
pub use registry::{LoadSource, SlotPhase, SlotRegistry, SlotView};
pub use release::ReleaseCoordinator;
pub use retry::RetryPolicy;
pub use slot_clock::{SlotClock, SlotId, SlotWindow};
pub use store::{
    Association, CapacityStore, MembershipStore, OrderStore, Reservation, ReserveOutcome,
    SlotControls, SlotInfo, SlotPlan, SlotSnapshot,
};
