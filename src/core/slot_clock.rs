//! Time quantization into fixed-width slots.
//!
//! A slot is a pure function of wall-clock time: any UTC instant belongs to
//! exactly one slot, identified by the epoch second of its start.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a slot: the epoch second of its start.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotId(pub i64);

impl SlotId {
    /// Epoch seconds of the slot start.
    pub const fn as_secs(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time bounds of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    /// Slot identifier.
    pub id: SlotId,
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl SlotWindow {
    /// Whether `instant` falls inside `[start, end)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Quantizes instants into slots of a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    duration: Duration,
}

impl SlotClock {
    /// Default slot width.
    pub const DEFAULT_MINUTES: i64 = 15;

    /// Create a clock with the given slot width.
    ///
    /// Widths below one second are raised to one second; configuration
    /// validation rejects them before they get here.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration: duration.max(Duration::seconds(1)),
        }
    }

    /// Slot width.
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Start of the slot containing `instant`.
    pub fn start_of(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.duration.num_seconds();
        let into_slot = instant.timestamp().rem_euclid(width);
        let subsec = i64::from(instant.timestamp_subsec_nanos());
        instant - Duration::seconds(into_slot) - Duration::nanoseconds(subsec)
    }

    /// Identifier of the slot starting at `slot_start`.
    pub fn id(&self, slot_start: DateTime<Utc>) -> SlotId {
        SlotId(slot_start.timestamp())
    }

    /// End of the slot starting at `slot_start`.
    pub fn end_of(&self, slot_start: DateTime<Utc>) -> DateTime<Utc> {
        slot_start + self.duration
    }

    /// Start of the slot following the one starting at `slot_start`.
    pub fn next(&self, slot_start: DateTime<Utc>) -> DateTime<Utc> {
        slot_start + self.duration
    }

    /// Full window for the slot starting at `slot_start`.
    pub fn window(&self, slot_start: DateTime<Utc>) -> SlotWindow {
        SlotWindow {
            id: self.id(slot_start),
            start: slot_start,
            end: self.end_of(slot_start),
        }
    }

    /// Window for a slot identifier, if the id maps to a representable instant.
    pub fn window_of(&self, id: SlotId) -> Option<SlotWindow> {
        DateTime::from_timestamp(id.0, 0).map(|start| self.window(self.start_of(start)))
    }
}

impl Default for SlotClock {
    fn default() -> Self {
        Self::new(Duration::minutes(Self::DEFAULT_MINUTES))
    }
}
