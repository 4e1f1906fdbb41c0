use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::Slot;
use crate::timerange::TimeRange;

use super::error::{ConflictingSlot, ScheduleError};
use super::SchedulingService;

/// Result of probing a candidate (date, start, end) against the
/// existing calendar. Exact duplicates are reported apart from partial
/// overlaps so the caller can word the rejection precisely.
pub(super) enum SlotClash {
    Exact(Slot),
    Overlap(Slot),
}

impl SchedulingService {
    /// Find the first active slot on `date`, in any lab, that the
    /// candidate range collides with. One lab may hold any given time
    /// period institution-wide, so the scan is deliberately global
    /// rather than scoped to the candidate's lab.
    ///
    /// First match in storage iteration order wins; callers must not
    /// read any priority into which of several conflicts is reported.
    pub(super) async fn find_clash(
        &self,
        date: NaiveDate,
        range: TimeRange,
        exclude: Option<Ulid>,
    ) -> Result<Option<SlotClash>, ScheduleError> {
        let candidates = self.storage().slots_on_date(date, exclude).await?;

        // Exact-match fast path: storage enforces (date, start, end)
        // uniqueness among active slots, so surface duplicates the same
        // way the constraint would.
        if let Some(exact) = candidates
            .iter()
            .find(|s| s.start_time == range.start && s.end_time == range.end)
        {
            return Ok(Some(SlotClash::Exact(exact.clone())));
        }

        Ok(candidates
            .into_iter()
            .find(|s| s.range().overlaps(&range))
            .map(SlotClash::Overlap))
    }
}

pub(super) fn conflicting(slot: &Slot) -> ConflictingSlot {
    ConflictingSlot {
        id: slot.id,
        lab: slot.lab,
        start_time: slot.start_time,
        end_time: slot.end_time,
    }
}
