use std::fmt;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::Entity;
use crate::storage::StorageError;
use crate::timerange::ClockTime;

/// The slot a candidate time range collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingSlot {
    pub id: Ulid,
    pub lab: Ulid,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

/// Why an exact-duplicate or dependency conflict was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCause {
    /// Same (date, start, end) as an existing active slot.
    DuplicateSlot { existing: Ulid },
    LabNameTaken { name: String, existing: Ulid },
    SlotHasActiveBookings { slot: Ulid, count: u64 },
    LabHasActiveSlots { lab: Ulid, count: u64 },
}

/// Why a slot refused a new booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Inactive,
    Cancelled,
    Completed,
    Full,
    Booked,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Inactive => write!(f, "slot is deactivated"),
            UnavailableReason::Cancelled => write!(f, "slot is cancelled"),
            UnavailableReason::Completed => write!(f, "slot is completed"),
            UnavailableReason::Full => write!(f, "slot is at capacity"),
            UnavailableReason::Booked => write!(f, "slot is already booked"),
        }
    }
}

/// Expected, typed outcomes of scheduling operations. Every variant
/// names the resource whose invariant was violated so the caller can
/// surface something actionable, not "operation failed".
#[derive(Debug)]
pub enum ScheduleError {
    Validation(String),
    NotFound(Entity, Ulid),
    Conflict(ConflictCause),
    TimeConflict {
        date: NaiveDate,
        start_time: ClockTime,
        end_time: ClockTime,
        existing: ConflictingSlot,
    },
    AlreadyBooked { booking: Ulid },
    DuplicateLabDay { booking: Ulid, lab: Ulid, date: NaiveDate },
    SlotUnavailable { slot: Ulid, reason: UnavailableReason },
    TooLate { minutes_before_start: i64, lead_minutes: i64 },
    Unauthorized,
    InvalidState(&'static str),
    /// Genuinely unexpected storage failure; not a business outcome.
    Storage(String),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::Validation(msg) => write!(f, "validation failed: {msg}"),
            ScheduleError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            ScheduleError::Conflict(cause) => match cause {
                ConflictCause::DuplicateSlot { existing } => {
                    write!(f, "a slot with the same date and times already exists: {existing}")
                }
                ConflictCause::LabNameTaken { name, existing } => {
                    write!(f, "lab name {name:?} is already used by active lab {existing}")
                }
                ConflictCause::SlotHasActiveBookings { slot, count } => write!(
                    f,
                    "slot {slot} still has {count} active booking(s); cancel them first"
                ),
                ConflictCause::LabHasActiveSlots { lab, count } => write!(
                    f,
                    "lab {lab} still has {count} active slot(s); remove them first"
                ),
            },
            ScheduleError::TimeConflict { date, start_time, end_time, existing } => write!(
                f,
                "{date} {start_time} - {end_time} conflicts with slot {} ({} - {}) in lab {}",
                existing.id, existing.start_time, existing.end_time, existing.lab
            ),
            ScheduleError::AlreadyBooked { booking } => {
                write!(f, "this slot was already booked by the faculty (booking {booking})")
            }
            ScheduleError::DuplicateLabDay { booking, lab, date } => write!(
                f,
                "faculty already holds an active booking in lab {lab} on {date} (booking {booking})"
            ),
            ScheduleError::SlotUnavailable { slot, reason } => {
                write!(f, "slot {slot} is not bookable: {reason}")
            }
            ScheduleError::TooLate { minutes_before_start, lead_minutes } => write!(
                f,
                "cancellation requires {lead_minutes} minutes of lead time; \
                 only {minutes_before_start} remain"
            ),
            ScheduleError::Unauthorized => {
                write!(f, "actor is not allowed to perform this operation")
            }
            ScheduleError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            ScheduleError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Storage-level uniqueness violations become their business-rule
/// counterparts; everything else is an unexpected failure.
impl From<StorageError> for ScheduleError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateSlot { existing } => {
                ScheduleError::Conflict(ConflictCause::DuplicateSlot { existing })
            }
            StorageError::DuplicateBooking { existing } => {
                ScheduleError::AlreadyBooked { booking: existing }
            }
            other => ScheduleError::Storage(other.to_string()),
        }
    }
}
