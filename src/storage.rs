use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{Booking, BookingStatus, Entity, Lab, Slot, SlotStatus};

/// Failures surfaced by a storage backend. Uniqueness violations are
/// reported distinctly so the service can translate them into the
/// matching business error instead of a generic failure.
#[derive(Debug)]
pub enum StorageError {
    /// An active slot with the same (date, start, end) already exists.
    DuplicateSlot { existing: Ulid },
    /// A booking for the same (faculty, slot) already exists.
    DuplicateBooking { existing: Ulid },
    /// Update/delete addressed a row that is not there.
    Missing { entity: Entity, id: Ulid },
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DuplicateSlot { existing } => {
                write!(f, "active slot with identical date and times exists: {existing}")
            }
            StorageError::DuplicateBooking { existing } => {
                write!(f, "booking for this faculty and slot exists: {existing}")
            }
            StorageError::Missing { entity, id } => write!(f, "{entity} missing: {id}"),
            StorageError::Backend(e) => write!(f, "storage backend error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Slot listing filter. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotFilter {
    pub lab: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub status: Option<SlotStatus>,
    pub active_only: bool,
}

/// Persistence seam for labs, slots, and bookings.
///
/// Implementations must enforce two uniqueness constraints regardless of
/// what the caller already checked: (faculty, slot) across all bookings,
/// and (date, start, end) across active slots. These are the last line
/// of defense against racing requests.
#[async_trait]
pub trait Storage: Send + Sync {
    // ── Labs ─────────────────────────────────────────────────

    async fn insert_lab(&self, lab: Lab) -> Result<(), StorageError>;
    async fn lab(&self, id: Ulid) -> Result<Option<Lab>, StorageError>;
    async fn update_lab(&self, lab: Lab) -> Result<(), StorageError>;
    async fn labs(&self) -> Result<Vec<Lab>, StorageError>;
    /// Active lab with this exact name, excluding `exclude` if given.
    async fn find_active_lab_by_name(
        &self,
        name: &str,
        exclude: Option<Ulid>,
    ) -> Result<Option<Lab>, StorageError>;

    // ── Slots ────────────────────────────────────────────────

    async fn insert_slot(&self, slot: Slot) -> Result<(), StorageError>;
    async fn slot(&self, id: Ulid) -> Result<Option<Slot>, StorageError>;
    async fn update_slot(&self, slot: Slot) -> Result<(), StorageError>;
    /// Hard delete.
    async fn remove_slot(&self, id: Ulid) -> Result<(), StorageError>;
    /// Active slots on a date, across all labs, excluding `exclude`.
    async fn slots_on_date(
        &self,
        date: NaiveDate,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Slot>, StorageError>;
    async fn slots(&self, filter: SlotFilter) -> Result<Vec<Slot>, StorageError>;
    async fn count_active_slots_for_lab(&self, lab: Ulid) -> Result<u64, StorageError>;

    // ── Bookings ─────────────────────────────────────────────

    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError>;
    async fn booking(&self, id: Ulid) -> Result<Option<Booking>, StorageError>;
    async fn update_booking(&self, booking: Booking) -> Result<(), StorageError>;
    /// The (faculty, slot) booking if one exists, any status.
    async fn find_booking(
        &self,
        faculty: Ulid,
        slot: Ulid,
    ) -> Result<Option<Booking>, StorageError>;
    async fn bookings_for_slot(
        &self,
        slot: Ulid,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, StorageError>;
    async fn count_active_bookings_for_slot(&self, slot: Ulid) -> Result<u64, StorageError>;
    async fn bookings_for_faculty(
        &self,
        faculty: Ulid,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, StorageError>;
    /// All bookings currently in status booked.
    async fn active_bookings(&self) -> Result<Vec<Booking>, StorageError>;
}

/// DashMap-backed store. The bundled implementation for tests and for
/// embedders that do not need durable persistence.
pub struct MemoryStore {
    labs: DashMap<Ulid, Lab>,
    slots: DashMap<Ulid, Slot>,
    bookings: DashMap<Ulid, Booking>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            labs: DashMap::new(),
            slots: DashMap::new(),
            bookings: DashMap::new(),
        }
    }

    fn slot_duplicate_of(&self, candidate: &Slot) -> Option<Ulid> {
        if !candidate.active {
            return None;
        }
        self.slots.iter().find_map(|entry| {
            let s = entry.value();
            (s.id != candidate.id
                && s.active
                && s.date == candidate.date
                && s.start_time == candidate.start_time
                && s.end_time == candidate.end_time)
                .then_some(s.id)
        })
    }

    fn booking_duplicate_of(&self, candidate: &Booking) -> Option<Ulid> {
        self.bookings.iter().find_map(|entry| {
            let b = entry.value();
            (b.id != candidate.id && b.faculty == candidate.faculty && b.slot == candidate.slot)
                .then_some(b.id)
        })
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn insert_lab(&self, lab: Lab) -> Result<(), StorageError> {
        self.labs.insert(lab.id, lab);
        Ok(())
    }

    async fn lab(&self, id: Ulid) -> Result<Option<Lab>, StorageError> {
        Ok(self.labs.get(&id).map(|e| e.value().clone()))
    }

    async fn update_lab(&self, lab: Lab) -> Result<(), StorageError> {
        if !self.labs.contains_key(&lab.id) {
            return Err(StorageError::Missing { entity: Entity::Lab, id: lab.id });
        }
        self.labs.insert(lab.id, lab);
        Ok(())
    }

    async fn labs(&self) -> Result<Vec<Lab>, StorageError> {
        Ok(self.labs.iter().map(|e| e.value().clone()).collect())
    }

    async fn find_active_lab_by_name(
        &self,
        name: &str,
        exclude: Option<Ulid>,
    ) -> Result<Option<Lab>, StorageError> {
        Ok(self.labs.iter().find_map(|entry| {
            let lab = entry.value();
            (lab.active && lab.name == name && Some(lab.id) != exclude).then(|| lab.clone())
        }))
    }

    async fn insert_slot(&self, slot: Slot) -> Result<(), StorageError> {
        if let Some(existing) = self.slot_duplicate_of(&slot) {
            return Err(StorageError::DuplicateSlot { existing });
        }
        self.slots.insert(slot.id, slot);
        Ok(())
    }

    async fn slot(&self, id: Ulid) -> Result<Option<Slot>, StorageError> {
        Ok(self.slots.get(&id).map(|e| e.value().clone()))
    }

    async fn update_slot(&self, slot: Slot) -> Result<(), StorageError> {
        if !self.slots.contains_key(&slot.id) {
            return Err(StorageError::Missing { entity: Entity::Slot, id: slot.id });
        }
        if let Some(existing) = self.slot_duplicate_of(&slot) {
            return Err(StorageError::DuplicateSlot { existing });
        }
        self.slots.insert(slot.id, slot);
        Ok(())
    }

    async fn remove_slot(&self, id: Ulid) -> Result<(), StorageError> {
        self.slots
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::Missing { entity: Entity::Slot, id })
    }

    async fn slots_on_date(
        &self,
        date: NaiveDate,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Slot>, StorageError> {
        Ok(self
            .slots
            .iter()
            .filter(|e| {
                let s = e.value();
                s.active && s.date == date && Some(s.id) != exclude
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn slots(&self, filter: SlotFilter) -> Result<Vec<Slot>, StorageError> {
        Ok(self
            .slots
            .iter()
            .filter(|e| {
                let s = e.value();
                (!filter.active_only || s.active)
                    && filter.lab.is_none_or(|l| s.lab == l)
                    && filter.date.is_none_or(|d| s.date == d)
                    && filter.status.is_none_or(|st| s.status == st)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn count_active_slots_for_lab(&self, lab: Ulid) -> Result<u64, StorageError> {
        Ok(self
            .slots
            .iter()
            .filter(|e| e.value().active && e.value().lab == lab)
            .count() as u64)
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError> {
        if let Some(existing) = self.booking_duplicate_of(&booking) {
            return Err(StorageError::DuplicateBooking { existing });
        }
        self.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn booking(&self, id: Ulid) -> Result<Option<Booking>, StorageError> {
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn update_booking(&self, booking: Booking) -> Result<(), StorageError> {
        if !self.bookings.contains_key(&booking.id) {
            return Err(StorageError::Missing { entity: Entity::Booking, id: booking.id });
        }
        self.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn find_booking(
        &self,
        faculty: Ulid,
        slot: Ulid,
    ) -> Result<Option<Booking>, StorageError> {
        Ok(self.bookings.iter().find_map(|entry| {
            let b = entry.value();
            (b.faculty == faculty && b.slot == slot).then(|| b.clone())
        }))
    }

    async fn bookings_for_slot(
        &self,
        slot: Ulid,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, StorageError> {
        Ok(self
            .bookings
            .iter()
            .filter(|e| {
                let b = e.value();
                b.slot == slot && status.is_none_or(|st| b.status == st)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn count_active_bookings_for_slot(&self, slot: Ulid) -> Result<u64, StorageError> {
        Ok(self
            .bookings
            .iter()
            .filter(|e| e.value().slot == slot && e.value().is_active())
            .count() as u64)
    }

    async fn bookings_for_faculty(
        &self,
        faculty: Ulid,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, StorageError> {
        Ok(self
            .bookings
            .iter()
            .filter(|e| {
                let b = e.value();
                b.faculty == faculty && status.is_none_or(|st| b.status == st)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn active_bookings(&self) -> Result<Vec<Booking>, StorageError> {
        Ok(self
            .bookings
            .iter()
            .filter(|e| e.value().is_active())
            .map(|e| e.value().clone())
            .collect())
    }
}
