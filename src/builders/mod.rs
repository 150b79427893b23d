//! Builders to construct the scheduler from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{Scheduler, SchedulerBuilder};
