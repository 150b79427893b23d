//! # Kitchen Slots
//!
//! Capacity-bounded admission control for scheduling kitchen orders into
//! fixed-width future time windows ("slots").
//!
//! A kitchen's production capacity is a monetary ceiling per slot, not an
//! order count. Many requests race to reserve capacity in the same slot, so
//! every check-and-update runs as one atomic primitive inside the
//! [`core::CapacityStore`] backend; there is no global lock in the process.
//!
//! ## Components
//!
//! - **SlotClock**: quantizes a UTC instant to the start of its slot and
//!   derives a stable [`core::SlotId`].
//! - **CapacityStore / MembershipStore**: atomic reserve/release, observational
//!   reads, pending/active membership sets and the order→slot reverse index.
//! - **AdmissionController**: walks forward slot by slot from "now" applying
//!   business hours and the near-miss guard until a reservation succeeds.
//! - **ReleaseCoordinator**: idempotent inverse of admission.
//! - **SlotRegistry**: self-consistent view of a whole trading day.
//! - **BootstrapRecovery**: repopulates membership after a restart.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kitchen_slots::builders::SchedulerBuilder;
//! use kitchen_slots::config::KitchenConfig;
//! use kitchen_slots::core::OrderId;
//! use kitchen_slots::infra::{InMemoryOrderStore, InMemoryStore};
//! use kitchen_slots::util::SystemClock;
//!
//! let config = KitchenConfig::from_env()?;
//! let clock = Arc::new(SystemClock);
//! let store = Arc::new(InMemoryStore::new(clock.clone(), config.state_ttl()));
//! let orders = Arc::new(InMemoryOrderStore::new());
//!
//! // Recovery runs inside `start` before any admission can be served.
//! let scheduler = SchedulerBuilder::new(config, store, orders, clock).start().await?;
//!
//! let admission = scheduler.admission().admit(OrderId::new(), 2_500, 3).await?;
//! println!("slot {} visible at {}", admission.slot_id, admission.visible_at);
//! ```
//!
//! For complete examples, see:
//! - `tests/admission_test.rs` - admission algorithm scenarios
//! - `tests/concurrency_test.rs` - racing reservations against one slot

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models and validation.
pub mod config;
/// Builders to construct the scheduler from configuration.
pub mod builders;
/// Infrastructure adapters for the capacity store and the order store.
pub mod infra;
/// Runtime workers and API surface models.
pub mod runtime;
/// Shared utilities.
pub mod util;
