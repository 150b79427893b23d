//! Order-side value types shared by admission, recovery and the order store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SlotId;

/// Order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of an order as persisted by the durable order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Admitted and waiting for its slot.
    Scheduled,
    /// Being prepared.
    Preparing,
    /// Finished, waiting for hand-off.
    Ready,
    /// Handed to the customer.
    Delivered,
    /// Cancelled before delivery.
    Cancelled,
}

impl OrderStatus {
    /// Terminal orders hold no membership and no reservation.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Orders production has already started on are always visible.
    pub const fn in_production(self) -> bool {
        matches!(self, Self::Preparing | Self::Ready)
    }

    /// Storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Every status that is not terminal.
    pub const IN_FLIGHT: [Self; 3] = [Self::Scheduled, Self::Preparing, Self::Ready];
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status `{other}`")),
        }
    }
}

/// A non-terminal order as read back from durable storage during recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightOrder {
    /// Order identifier.
    pub order_id: OrderId,
    /// Current status.
    pub status: OrderStatus,
    /// Total monetary value reserved at admission, in currency units.
    pub value: i64,
    /// Assigned slot, if the order went through admission.
    pub slot_id: Option<SlotId>,
    /// Persisted visibility time, if recorded.
    pub visible_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Admitted order.
    pub order_id: OrderId,
    /// Assigned slot.
    pub slot_id: SlotId,
    /// Start of the assigned slot.
    pub slot_start: DateTime<Utc>,
    /// End of the assigned slot.
    pub slot_end: DateTime<Utc>,
    /// When production staff should start seeing the order.
    pub visible_at: DateTime<Utc>,
    /// Amount added to the slot's load.
    pub reserved_value: i64,
    /// Slot load right after the reservation.
    pub load_after: i64,
}
