use chrono::NaiveDate;
use serde::Serialize;
use ulid::Ulid;

use crate::model::{Booking, BookingStatus, Entity, Slot, SlotStatus};
use crate::storage::SlotFilter;
use crate::timerange::ClockTime;

use super::error::ScheduleError;
use super::SchedulingService;

/// Read-side slot listing filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotQuery {
    pub lab: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub status: Option<SlotStatus>,
}

/// A slot together with its live booking information.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    pub current_bookings: u64,
    pub is_available: bool,
}

/// A booking joined with its slot and lab, the way dashboards list it.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub lab: Option<Ulid>,
    pub lab_name: Option<String>,
    pub lab_active: Option<bool>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub can_cancel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotStats {
    pub total_active: u64,
    pub available_upcoming: u64,
    pub booked: u64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabStats {
    pub active_labs: u64,
    pub active_slots: u64,
}

impl SchedulingService {
    /// Single-slot read. Lapse is evaluated here: a slot read after its
    /// end instant completes (and completes its bookings) before being
    /// returned.
    pub async fn get_slot(&self, id: Ulid) -> Result<SlotView, ScheduleError> {
        let (_guard, mut slot) = self.lock_slot_date(id).await?;
        self.complete_slot_if_lapsed(&mut slot, self.now()).await?;
        let current_bookings = self.storage().count_active_bookings_for_slot(id).await?;
        let is_available = slot.is_available();
        Ok(SlotView { slot, current_bookings, is_available })
    }

    /// Active slots matching the query, ordered by date then start.
    /// Lapse is reflected in `is_available` without being persisted;
    /// the sweep (or a single-slot read) performs the actual
    /// transition.
    pub async fn list_slots(&self, query: SlotQuery) -> Result<Vec<SlotView>, ScheduleError> {
        let now = self.now();
        let mut slots = self
            .storage()
            .slots(SlotFilter {
                lab: query.lab,
                date: query.date,
                status: query.status,
                active_only: true,
            })
            .await?;
        slots.sort_by_key(|s| (s.date, s.start_time));

        let mut views = Vec::with_capacity(slots.len());
        for slot in slots {
            let current_bookings =
                self.storage().count_active_bookings_for_slot(slot.id).await?;
            let is_available = slot.is_available() && !slot.has_lapsed(now);
            views.push(SlotView { slot, current_bookings, is_available });
        }
        Ok(views)
    }

    /// Bookable slots from `from` onwards (today, usually).
    pub async fn list_available_slots(
        &self,
        from: NaiveDate,
        lab: Option<Ulid>,
    ) -> Result<Vec<SlotView>, ScheduleError> {
        let views = self
            .list_slots(SlotQuery { lab, date: None, status: Some(SlotStatus::Available) })
            .await?;
        Ok(views
            .into_iter()
            .filter(|v| v.slot.date >= from && v.is_available)
            .collect())
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingView, ScheduleError> {
        let booking = self
            .storage()
            .booking(id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Booking, id))?;
        self.booking_view(booking).await
    }

    /// A faculty's bookings, newest first.
    pub async fn list_faculty_bookings(
        &self,
        faculty: Ulid,
        status: Option<BookingStatus>,
    ) -> Result<Vec<BookingView>, ScheduleError> {
        let mut bookings = self.storage().bookings_for_faculty(faculty, status).await?;
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            views.push(self.booking_view(booking).await?);
        }
        Ok(views)
    }

    pub async fn list_slot_bookings(&self, slot_id: Ulid) -> Result<Vec<Booking>, ScheduleError> {
        self.storage()
            .slot(slot_id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Slot, slot_id))?;
        let mut bookings = self.storage().bookings_for_slot(slot_id, None).await?;
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
        Ok(bookings)
    }

    pub async fn slot_stats(&self) -> Result<SlotStats, ScheduleError> {
        let now = self.now();
        let slots = self
            .storage()
            .slots(SlotFilter { active_only: true, ..Default::default() })
            .await?;
        let total_active = slots.len() as u64;
        let available_upcoming = slots
            .iter()
            .filter(|s| s.status == SlotStatus::Available && s.date >= now.date())
            .count() as u64;
        let booked = slots
            .iter()
            .filter(|s| s.status == SlotStatus::Booked)
            .count() as u64;
        let utilization_pct = if total_active > 0 {
            booked as f64 / total_active as f64 * 100.0
        } else {
            0.0
        };
        Ok(SlotStats { total_active, available_upcoming, booked, utilization_pct })
    }

    pub async fn lab_stats(&self) -> Result<LabStats, ScheduleError> {
        let active_labs = self
            .storage()
            .labs()
            .await?
            .iter()
            .filter(|l| l.active)
            .count() as u64;
        let active_slots = self
            .storage()
            .slots(SlotFilter { active_only: true, ..Default::default() })
            .await?
            .len() as u64;
        Ok(LabStats { active_labs, active_slots })
    }

    async fn booking_view(&self, booking: Booking) -> Result<BookingView, ScheduleError> {
        let slot = self.storage().slot(booking.slot).await?;
        let lab = match &slot {
            Some(s) => self.storage().lab(s.lab).await?,
            None => None,
        };
        let can_cancel = match &slot {
            Some(s) => {
                booking.is_active()
                    && (s.start_instant() - self.now()).num_minutes()
                        >= self.config().cancel_lead_time.num_minutes()
            }
            None => false,
        };
        Ok(BookingView {
            can_cancel,
            lab: slot.as_ref().map(|s| s.lab),
            lab_name: lab.as_ref().map(|l| l.name.clone()),
            lab_active: lab.as_ref().map(|l| l.active),
            date: slot.as_ref().map(|s| s.date),
            start_time: slot.as_ref().map(|s| s.start_time),
            end_time: slot.as_ref().map(|s| s.end_time),
            booking,
        })
    }
}
