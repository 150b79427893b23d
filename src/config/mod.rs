//! Configuration models and validation.

pub mod kitchen;

pub use kitchen::{BusinessHours, KitchenConfig};
