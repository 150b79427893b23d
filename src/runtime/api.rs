//! Transport-agnostic request/response models over the scheduler.

use serde::{Deserialize, Serialize};

use crate::builders::Scheduler;
use crate::core::{AdmissionError, OrderId, SlotId, SlotView, StoreError};

/// Admission request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitRequest {
    /// Order identifier.
    pub order_id: OrderId,
    /// Monetary value in currency units.
    pub value: i64,
    /// Number of line items.
    #[serde(default)]
    pub item_count: u32,
}

/// Successful admission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitResponse {
    /// Order identifier.
    pub order_id: OrderId,
    /// Assigned slot.
    pub slot_id: SlotId,
    /// Slot start (RFC 3339).
    pub slot_start: chrono::DateTime<chrono::Utc>,
    /// When production sees the order.
    pub visible_at: chrono::DateTime<chrono::Utc>,
}

/// Error payload with a stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether resubmitting later may succeed.
    pub retryable: bool,
}

impl From<&AdmissionError> for ErrorResponse {
    fn from(err: &AdmissionError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl From<&anyhow::Error> for ErrorResponse {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(admission) = err.downcast_ref::<AdmissionError>() {
            return Self::from(admission);
        }
        if let Some(store) = err.downcast_ref::<StoreError>() {
            return Self {
                message: format!("{err:#}"),
                ..Self::from(store)
            };
        }
        Self {
            code: "internal".to_string(),
            message: format!("{err:#}"),
            retryable: false,
        }
    }
}

impl From<&StoreError> for ErrorResponse {
    fn from(err: &StoreError) -> Self {
        Self {
            code: "store_unavailable".to_string(),
            message: err.to_string(),
            retryable: err.is_transient(),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Orders restored by the startup recovery, if it ran.
    pub recovered: Option<usize>,
}

/// Admit an order and persist its slot assignment.
pub async fn admit_order(
    scheduler: &Scheduler,
    req: AdmitRequest,
) -> Result<AdmitResponse, ErrorResponse> {
    scheduler
        .schedule_order(req.order_id, req.value, req.item_count)
        .await
        .map(|admission| AdmitResponse {
            order_id: admission.order_id,
            slot_id: admission.slot_id,
            slot_start: admission.slot_start,
            visible_at: admission.visible_at,
        })
        .map_err(|e| ErrorResponse::from(&e))
}

/// Cancel an order, releasing its capacity. Unknown orders succeed.
pub async fn release_order(scheduler: &Scheduler, order_id: OrderId) -> Result<(), ErrorResponse> {
    scheduler
        .release()
        .cancel(&order_id)
        .await
        .map_err(|e| ErrorResponse::from(&e))
}

/// List the current trading day.
pub async fn list_slots(scheduler: &Scheduler) -> Result<Vec<SlotView>, ErrorResponse> {
    scheduler
        .registry()
        .list_day()
        .await
        .map_err(|e| ErrorResponse::from(&e))
}

/// Return a health payload.
pub fn health(scheduler: &Scheduler) -> Health {
    Health {
        ok: true,
        recovered: scheduler.last_recovery().map(|report| report.restored),
    }
}
