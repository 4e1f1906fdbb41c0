use ulid::Ulid;

use crate::limits::MAX_NOTES_LEN;
use crate::model::{Booking, BookingStatus, Entity, SlotStatus};
use crate::notify::{BookingNotice, ScheduleEvent};
use crate::observability;

use super::conflict::conflicting;
use super::error::{ScheduleError, UnavailableReason};
use super::SchedulingService;

/// Who is asking for a booking mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Faculty(Ulid),
}

impl SchedulingService {
    /// Reserve a slot for a faculty member.
    ///
    /// Validation order: the slot must exist; the faculty must not
    /// already hold a booking for it (any status); the slot must be
    /// active and available; the faculty must not hold another active
    /// booking in the same lab on the same day; and no other faculty's
    /// active booking on that lab and day may overlap this slot's time
    /// range. The last guard exists
    /// because slot-level conflict prevention alone cannot stop two
    /// racing requests against separately-created overlapping slots.
    pub async fn book_slot(
        &self,
        faculty: Ulid,
        slot_id: Ulid,
        notes: Option<String>,
    ) -> Result<Booking, ScheduleError> {
        let timer = std::time::Instant::now();
        if let Some(n) = &notes
            && n.len() > MAX_NOTES_LEN
        {
            return Err(ScheduleError::Validation("booking notes too long".into()));
        }

        let (_guard, mut slot) = self.lock_slot_date(slot_id).await?;
        let now = self.now();

        // A lapsed slot completes on first touch; the booking attempt
        // then sees it as such.
        self.complete_slot_if_lapsed(&mut slot, now).await?;

        // Checked before availability: once the faculty's own booking
        // has closed the slot, a repeat attempt must still name that
        // booking rather than a generic unavailability.
        if let Some(existing) = self.storage().find_booking(faculty, slot_id).await? {
            return Err(ScheduleError::AlreadyBooked { booking: existing.id });
        }

        if !slot.is_available() {
            let reason = if !slot.active {
                UnavailableReason::Inactive
            } else if slot.status == SlotStatus::Cancelled {
                UnavailableReason::Cancelled
            } else if slot.status == SlotStatus::Completed {
                UnavailableReason::Completed
            } else if slot.capacity > 0 && slot.booked_count >= slot.capacity {
                UnavailableReason::Full
            } else {
                UnavailableReason::Booked
            };
            return Err(ScheduleError::SlotUnavailable { slot: slot_id, reason });
        }

        // One active booking per (faculty, lab, day).
        for other in self
            .storage()
            .bookings_for_faculty(faculty, Some(BookingStatus::Booked))
            .await?
        {
            let Some(other_slot) = self.storage().slot(other.slot).await? else {
                continue;
            };
            if other_slot.lab == slot.lab && other_slot.date == slot.date {
                return Err(ScheduleError::DuplicateLabDay {
                    booking: other.id,
                    lab: slot.lab,
                    date: slot.date,
                });
            }
        }

        // No other faculty's active booking in this lab and day may
        // overlap this slot's range.
        for other_slot in self.storage().slots_on_date(slot.date, Some(slot_id)).await? {
            if other_slot.lab != slot.lab || !other_slot.range().overlaps(&slot.range()) {
                continue;
            }
            let holders = self
                .storage()
                .bookings_for_slot(other_slot.id, Some(BookingStatus::Booked))
                .await?;
            if holders.iter().any(|b| b.faculty != faculty) {
                return Err(ScheduleError::TimeConflict {
                    date: slot.date,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    existing: conflicting(&other_slot),
                });
            }
        }

        let booking = Booking {
            id: Ulid::new(),
            faculty,
            slot: slot_id,
            status: BookingStatus::Booked,
            notes,
            booked_at: now,
            cancelled_at: None,
            updated_at: now,
        };
        // Storage enforces (faculty, slot) uniqueness; a concurrent
        // duplicate surfaces as AlreadyBooked via the error mapping.
        self.storage().insert_booking(booking.clone()).await?;

        slot.booked_count += 1;
        slot.recompute_status();
        slot.updated_at = now;
        self.storage().update_slot(slot.clone()).await?;

        self.notify_booking_created(&booking).await;

        self.events().send(
            slot.lab,
            &ScheduleEvent::BookingCreated {
                booking: booking.id,
                slot: slot_id,
                lab: slot.lab,
                faculty,
            },
        );
        observability::record_op("book_slot");
        metrics::histogram!(observability::BOOK_DURATION_SECONDS)
            .record(timer.elapsed().as_secs_f64());
        Ok(booking)
    }

    /// Cancel a booking. Admins and the owning faculty may cancel, and
    /// only outside the configured lead-time window before the slot's
    /// start.
    pub async fn cancel_booking(
        &self,
        actor: Actor,
        booking_id: Ulid,
    ) -> Result<Booking, ScheduleError> {
        let booking = self
            .storage()
            .booking(booking_id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Booking, booking_id))?;

        match actor {
            Actor::Admin => {}
            Actor::Faculty(id) if id == booking.faculty => {}
            Actor::Faculty(_) => return Err(ScheduleError::Unauthorized),
        }

        let (_guard, mut slot) = self.lock_slot_date(booking.slot).await?;
        let mut booking = self
            .storage()
            .booking(booking_id)
            .await?
            .ok_or(ScheduleError::NotFound(Entity::Booking, booking_id))?;
        if booking.status != BookingStatus::Booked {
            return Err(ScheduleError::InvalidState("booking is not active"));
        }

        let now = self.now();
        let minutes_before_start = (slot.start_instant() - now).num_minutes();
        let lead_minutes = self.config().cancel_lead_time.num_minutes();
        if minutes_before_start < lead_minutes {
            return Err(ScheduleError::TooLate { minutes_before_start, lead_minutes });
        }

        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(now);
        booking.updated_at = now;
        self.storage().update_booking(booking.clone()).await?;

        slot.booked_count = slot.booked_count.saturating_sub(1);
        slot.recompute_status();
        slot.updated_at = now;
        self.storage().update_slot(slot.clone()).await?;

        self.events().send(
            slot.lab,
            &ScheduleEvent::BookingCancelled {
                booking: booking.id,
                slot: slot.id,
                lab: slot.lab,
            },
        );
        observability::record_op("cancel_booking");
        Ok(booking)
    }

    /// Post-commit hook: the booking stands whether or not delivery
    /// works. Failures are logged and counted, never propagated.
    async fn notify_booking_created(&self, booking: &Booking) {
        let (lab_id, lab_name, date, start_time, end_time) =
            match self.storage().slot(booking.slot).await {
                Ok(Some(slot)) => {
                    let name = match self.storage().lab(slot.lab).await {
                        Ok(Some(lab)) => lab.name,
                        _ => String::new(),
                    };
                    (slot.lab, name, slot.date, slot.start_time, slot.end_time)
                }
                _ => return,
            };
        let notice = BookingNotice {
            booking: booking.id,
            faculty: booking.faculty,
            lab: lab_id,
            lab_name,
            date,
            start_time,
            end_time,
        };
        if let Err(e) = self.notifier().notify_booking_created(&notice).await {
            tracing::warn!(booking = %booking.id, "booking notification failed: {e}");
            metrics::counter!(observability::NOTIFY_FAILURES_TOTAL).increment(1);
        }
    }
}
