//! Runtime workers and API surface.

pub mod api;
pub mod promoter;

pub use api::{AdmitRequest, AdmitResponse, ErrorResponse, Health, admit_order, health, list_slots, release_order};
pub use promoter::{PromoterHandle, VisibilityPromoter};
