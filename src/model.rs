use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::timerange::{ClockTime, TimeRange};

/// Entity kinds, for lookup-failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Lab,
    Slot,
    Booking,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Lab => write!(f, "lab"),
            Entity::Slot => write!(f, "slot"),
            Entity::Booking => write!(f, "booking"),
        }
    }
}

/// A physical lab that slots are carved out of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lab {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub location: String,
    /// Seats; copied onto each slot at slot-creation time.
    pub capacity: u32,
    pub equipment: Vec<String>,
    /// Soft-delete flag. Name uniqueness applies to active labs only.
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Booked,
    Cancelled,
    Completed,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Booked => write!(f, "booked"),
            SlotStatus::Cancelled => write!(f, "cancelled"),
            SlotStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Status derivation. Cancelled and Completed are manual/terminal
/// overrides and are never replaced here; otherwise status follows the
/// live booking count.
pub fn derive_status(current: SlotStatus, booked_count: u32) -> SlotStatus {
    match current {
        SlotStatus::Cancelled | SlotStatus::Completed => current,
        _ if booked_count >= 1 => SlotStatus::Booked,
        _ => SlotStatus::Available,
    }
}

/// A bookable interval in one lab on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub lab: Ulid,
    /// Date-only semantics; time-of-day lives in start/end.
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// Snapshot of the lab capacity at creation. 0 means unbounded.
    pub capacity: u32,
    pub booked_count: u32,
    pub status: SlotStatus,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Slot {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn start_instant(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time.to_naive_time())
    }

    pub fn end_instant(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time.to_naive_time())
    }

    /// True once the wall clock is strictly past the slot's end.
    pub fn has_lapsed(&self, now: NaiveDateTime) -> bool {
        now > self.end_instant()
    }

    /// Re-derive status from the current booking count. Idempotent;
    /// a no-op while the slot is cancelled or completed.
    pub fn recompute_status(&mut self) {
        self.status = derive_status(self.status, self.booked_count);
    }

    /// Open for a new booking: active, status available, and below
    /// capacity (capacity 0 = unbounded).
    pub fn is_available(&self) -> bool {
        self.active
            && self.status == SlotStatus::Available
            && (self.capacity == 0 || self.booked_count < self.capacity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Completed,
    /// Set only through an external administrative action.
    #[serde(rename = "no-show")]
    NoShow,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Booked => write!(f, "booked"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::NoShow => write!(f, "no-show"),
        }
    }
}

/// A faculty member's claim on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub faculty: Ulid,
    pub slot: Ulid,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub booked_at: NaiveDateTime,
    pub cancelled_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Booked
    }
}
