use chrono::{Duration, NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::{BookingStatus, Entity, Slot, SlotStatus};
use crate::notify::ScheduleEvent;
use crate::observability;
use crate::storage::SlotFilter;
use crate::timerange::{ClockTime, TimeRange};

use super::conflict::{conflicting, SlotClash};
use super::error::{ConflictCause, ScheduleError};
use super::SchedulingService;

/// Partial slot update; unset fields are left alone. Any change to
/// lab, date, or times re-runs conflict detection (excluding the slot
/// itself).
#[derive(Debug, Clone, Default)]
pub struct SlotPatch {
    pub lab: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// What one completion sweep actually transitioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub slots_completed: u64,
    pub bookings_completed: u64,
}

fn parse_time(raw: &str) -> Result<ClockTime, ScheduleError> {
    raw.parse()
        .map_err(|e: crate::timerange::ParseTimeError| ScheduleError::Validation(e.to_string()))
}

fn validated_range(start: ClockTime, end: ClockTime) -> Result<TimeRange, ScheduleError> {
    if start >= end {
        return Err(ScheduleError::Validation(format!(
            "start time {start} must precede end time {end}"
        )));
    }
    Ok(TimeRange::new(start, end))
}

impl SchedulingService {
    pub async fn add_slot(
        &self,
        lab_id: Ulid,
        date: NaiveDate,
        start: &str,
        end: &str,
    ) -> Result<Slot, ScheduleError> {
        let start_time = parse_time(start)?;
        let end_time = parse_time(end)?;
        let range = validated_range(start_time, end_time)?;

        let now = self.now();
        let horizon = now.date() + Duration::days(self.config().slot_advance_days as i64);
        if date > horizon {
            return Err(ScheduleError::Validation(format!(
                "slots may be scheduled at most {} days ahead",
                self.config().slot_advance_days
            )));
        }

        let lab = self
            .storage()
            .lab(lab_id)
            .await?
            .filter(|l| l.active)
            .ok_or(ScheduleError::NotFound(Entity::Lab, lab_id))?;

        let _guard = self.lock_dates(vec![date]).await;
        match self.find_clash(date, range, None).await? {
            Some(SlotClash::Exact(existing)) => {
                return Err(ScheduleError::Conflict(ConflictCause::DuplicateSlot {
                    existing: existing.id,
                }));
            }
            Some(SlotClash::Overlap(existing)) => {
                return Err(ScheduleError::TimeConflict {
                    date,
                    start_time,
                    end_time,
                    existing: conflicting(&existing),
                });
            }
            None => {}
        }

        let slot = Slot {
            id: Ulid::new(),
            lab: lab.id,
            date,
            start_time,
            end_time,
            capacity: lab.capacity,
            booked_count: 0,
            status: SlotStatus::Available,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage().insert_slot(slot.clone()).await?;

        self.events()
            .send(lab.id, &ScheduleEvent::SlotAdded { slot: slot.id, lab: lab.id, date });
        observability::record_op("add_slot");
        Ok(slot)
    }

    pub async fn update_slot(&self, id: Ulid, patch: SlotPatch) -> Result<Slot, ScheduleError> {
        let patched_start = patch.start_time.as_deref().map(parse_time).transpose()?;
        let patched_end = patch.end_time.as_deref().map(parse_time).transpose()?;

        if let Some(lab_id) = patch.lab {
            self.storage()
                .lab(lab_id)
                .await?
                .filter(|l| l.active)
                .ok_or(ScheduleError::NotFound(Entity::Lab, lab_id))?;
        }

        // Lock the current and target dates together (sorted), then
        // re-read; a concurrent update may have moved the slot.
        let (_guards, mut slot) = loop {
            let slot = self
                .storage()
                .slot(id)
                .await?
                .ok_or(ScheduleError::NotFound(Entity::Slot, id))?;
            let new_date = patch.date.unwrap_or(slot.date);
            let guards = self.lock_dates(vec![slot.date, new_date]).await;
            let fresh = self
                .storage()
                .slot(id)
                .await?
                .ok_or(ScheduleError::NotFound(Entity::Slot, id))?;
            if fresh.date == slot.date {
                break (guards, fresh);
            }
        };

        let new_date = patch.date.unwrap_or(slot.date);
        let start_time = patched_start.unwrap_or(slot.start_time);
        let end_time = patched_end.unwrap_or(slot.end_time);
        let range = validated_range(start_time, end_time)?;

        match self.find_clash(new_date, range, Some(id)).await? {
            Some(SlotClash::Exact(existing)) => {
                return Err(ScheduleError::Conflict(ConflictCause::DuplicateSlot {
                    existing: existing.id,
                }));
            }
            Some(SlotClash::Overlap(existing)) => {
                return Err(ScheduleError::TimeConflict {
                    date: new_date,
                    start_time,
                    end_time,
                    existing: conflicting(&existing),
                });
            }
            None => {}
        }

        if let Some(lab_id) = patch.lab {
            slot.lab = lab_id;
        }
        slot.date = new_date;
        slot.start_time = start_time;
        slot.end_time = end_time;
        slot.updated_at = self.now();
        self.storage().update_slot(slot.clone()).await?;

        self.events()
            .send(slot.lab, &ScheduleEvent::SlotUpdated { slot: slot.id, lab: slot.lab });
        observability::record_op("update_slot");
        Ok(slot)
    }

    /// Manual override: mark the slot cancelled without touching its
    /// booking counter. Completed is terminal.
    pub async fn cancel_slot(&self, id: Ulid) -> Result<Slot, ScheduleError> {
        let (_guard, mut slot) = self.lock_slot_date(id).await?;
        if slot.status == SlotStatus::Completed {
            return Err(ScheduleError::InvalidState("slot is already completed"));
        }
        slot.status = SlotStatus::Cancelled;
        slot.updated_at = self.now();
        self.storage().update_slot(slot.clone()).await?;

        self.events()
            .send(slot.lab, &ScheduleEvent::SlotCancelled { slot: slot.id, lab: slot.lab });
        observability::record_op("cancel_slot");
        Ok(slot)
    }

    /// Undo a cancellation. The booking counter is rebuilt from the
    /// authoritative count of active bookings (the stale counter is
    /// not trusted) and status re-derived from that fresh count.
    pub async fn restore_slot(&self, id: Ulid) -> Result<Slot, ScheduleError> {
        let (_guard, mut slot) = self.lock_slot_date(id).await?;
        if !slot.active {
            return Err(ScheduleError::InvalidState("slot is deactivated"));
        }
        if slot.status != SlotStatus::Cancelled {
            return Err(ScheduleError::InvalidState("only a cancelled slot can be restored"));
        }

        let live = self.storage().count_active_bookings_for_slot(id).await?;
        slot.booked_count = live as u32;
        slot.status = SlotStatus::Available;
        slot.recompute_status();
        slot.updated_at = self.now();
        self.storage().update_slot(slot.clone()).await?;

        self.events()
            .send(slot.lab, &ScheduleEvent::SlotRestored { slot: slot.id, lab: slot.lab });
        observability::record_op("restore_slot");
        Ok(slot)
    }

    /// Soft delete by default; `hard` removes the row. Either way the
    /// slot must have no active bookings left.
    pub async fn delete_slot(&self, id: Ulid, hard: bool) -> Result<(), ScheduleError> {
        let (_guard, mut slot) = self.lock_slot_date(id).await?;

        let active = self.storage().count_active_bookings_for_slot(id).await?;
        if active > 0 {
            return Err(ScheduleError::Conflict(ConflictCause::SlotHasActiveBookings {
                slot: id,
                count: active,
            }));
        }

        if hard {
            self.storage().remove_slot(id).await?;
        } else {
            slot.active = false;
            slot.status = SlotStatus::Cancelled;
            slot.updated_at = self.now();
            self.storage().update_slot(slot.clone()).await?;
        }

        self.events()
            .send(slot.lab, &ScheduleEvent::SlotDeleted { slot: id, lab: slot.lab });
        observability::record_op("delete_slot");
        Ok(())
    }

    /// Transition a lapsed slot (and its still-booked bookings) to
    /// completed. Caller holds the slot's date lock. Returns the number
    /// of bookings completed, or None if the slot was not transitioned.
    pub(super) async fn complete_slot_if_lapsed(
        &self,
        slot: &mut Slot,
        now: NaiveDateTime,
    ) -> Result<Option<u64>, ScheduleError> {
        if !slot.active || slot.status == SlotStatus::Completed || !slot.has_lapsed(now) {
            return Ok(None);
        }
        slot.status = SlotStatus::Completed;
        slot.updated_at = now;
        self.storage().update_slot(slot.clone()).await?;

        let mut completed = 0u64;
        for mut booking in self
            .storage()
            .bookings_for_slot(slot.id, Some(BookingStatus::Booked))
            .await?
        {
            booking.status = BookingStatus::Completed;
            booking.updated_at = now;
            self.storage().update_booking(booking).await?;
            completed += 1;
        }

        self.events()
            .send(slot.lab, &ScheduleEvent::SlotCompleted { slot: slot.id, lab: slot.lab });
        Ok(Some(completed))
    }

    /// The completion sweep: every active slot whose end instant has
    /// passed becomes completed, and so does every booking still booked
    /// against a lapsed slot. Idempotent and safe to run concurrently
    /// with live traffic: each transition happens under the slot's
    /// date lock, so it cannot clobber an in-flight cancellation.
    pub async fn advance_time(&self) -> Result<SweepReport, ScheduleError> {
        let now = self.now();
        let mut report = SweepReport::default();

        let slots = self
            .storage()
            .slots(SlotFilter { active_only: true, ..Default::default() })
            .await?;
        for slot in slots {
            if slot.status == SlotStatus::Completed || !slot.has_lapsed(now) {
                continue;
            }
            let (_guard, mut fresh) = match self.lock_slot_date(slot.id).await {
                Ok(pair) => pair,
                // Hard-deleted since the listing; nothing to do.
                Err(ScheduleError::NotFound(..)) => continue,
                Err(e) => return Err(e),
            };
            if let Some(bookings) = self.complete_slot_if_lapsed(&mut fresh, now).await? {
                report.slots_completed += 1;
                report.bookings_completed += bookings;
            }
        }

        // Bookings can outlive their slot's transition (e.g. the slot
        // completed lazily during a read while the booking pass hadn't
        // run); pick those up here.
        for booking in self.storage().active_bookings().await? {
            let Some(slot) = self.storage().slot(booking.slot).await? else {
                continue;
            };
            if !slot.has_lapsed(now) {
                continue;
            }
            let (_guard, _slot) = match self.lock_slot_date(slot.id).await {
                Ok(pair) => pair,
                Err(ScheduleError::NotFound(..)) => continue,
                Err(e) => return Err(e),
            };
            if let Some(mut fresh) = self.storage().booking(booking.id).await?
                && fresh.status == BookingStatus::Booked
            {
                fresh.status = BookingStatus::Completed;
                fresh.updated_at = now;
                self.storage().update_booking(fresh).await?;
                report.bookings_completed += 1;
            }
        }

        metrics::counter!(observability::SWEEP_RUNS_TOTAL).increment(1);
        metrics::counter!(observability::SWEEP_SLOTS_COMPLETED_TOTAL)
            .increment(report.slots_completed);
        metrics::counter!(observability::SWEEP_BOOKINGS_COMPLETED_TOTAL)
            .increment(report.bookings_completed);
        Ok(report)
    }
}
