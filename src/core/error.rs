//! Error types for slot scheduling operations.

use thiserror::Error;

use crate::core::SlotId;

/// Failures raised by a capacity or order store backend.
///
/// Every variant except [`StoreError::Corrupt`] is retried. No store error
/// is ever evidence that a slot is full.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store did not answer within the configured I/O timeout.
    #[error("store timeout")]
    Timeout,
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// A stored value could not be decoded.
    #[error("corrupt value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Corrupt(_))
    }
}

/// Reasons an admission request does not produce a slot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// No slot inside business hours was reachable from now.
    #[error("kitchen closed")]
    KitchenClosed,
    /// Every remaining business-hours slot today rejected the order.
    #[error("fully booked")]
    FullyBooked,
    /// The store kept failing after the retry budget was spent.
    #[error("capacity store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    /// The order cannot be scheduled as submitted.
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    /// The order already holds a reservation.
    #[error("order already admitted to slot {0}")]
    AlreadyAdmitted(SlotId),
}

impl AdmissionError {
    /// Stable machine-readable code for caller-side messaging.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::KitchenClosed => "kitchen_closed",
            Self::FullyBooked => "fully_booked",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidOrder(_) => "invalid_order",
            Self::AlreadyAdmitted(_) => "already_admitted",
        }
    }

    /// Whether the same request may succeed if submitted again later.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::KitchenClosed | Self::FullyBooked | Self::StoreUnavailable(_)
        )
    }
}

/// Failures of administrative operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdminError {
    /// Capacity values must be strictly positive.
    #[error("invalid capacity {0}: must be greater than 0")]
    InvalidCapacity(i64),
    /// The identifier is not the start of a slot.
    #[error("invalid slot {0}: not aligned to a slot boundary")]
    InvalidSlot(SlotId),
    /// Plan shares must not be negative.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    /// The store rejected or failed the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
