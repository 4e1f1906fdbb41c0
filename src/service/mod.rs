mod bookings;
mod conflict;
pub mod error;
mod labs;
mod queries;
mod slots;

pub use bookings::Actor;
pub use labs::{LabPatch, NewLab};
pub use queries::{BookingView, LabStats, SlotQuery, SlotStats, SlotView};
pub use slots::{SlotPatch, SweepReport};

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::{Entity, Slot};
use crate::notify::{EventHub, Notifier};
use crate::storage::Storage;
use error::ScheduleError;

/// Policy knobs. Defaults mirror the institutional rules: two hours of
/// cancellation lead time, a half-hour completion sweep, slots
/// creatable up to thirty days ahead.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Minimum interval before a slot's start during which a booking
    /// can no longer be cancelled.
    pub cancel_lead_time: Duration,
    /// Cadence of the background completion sweep.
    pub sweep_interval: std::time::Duration,
    /// How far ahead of the current date a slot may be scheduled.
    pub slot_advance_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cancel_lead_time: Duration::hours(2),
            sweep_interval: std::time::Duration::from_secs(30 * 60),
            slot_advance_days: 30,
        }
    }
}

/// The scheduling façade. One logical transaction per operation:
/// validate, mutate, re-derive dependent state, then (best-effort)
/// notify. All slot/booking mutations for a calendar date serialize on
/// that date's mutex; conflict checking is global per date, so the
/// date is the unit of consistency.
pub struct SchedulingService {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: ScheduleConfig,
    events: EventHub,
    date_locks: DashMap<NaiveDate, Arc<Mutex<()>>>,
}

impl SchedulingService {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            notifier,
            config,
            events: EventHub::new(),
            date_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// In-process change feed; subscribe per lab.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub(super) fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub(super) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(super) fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    fn date_lock(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        self.date_locks
            .entry(date)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock one or more dates in sorted order (dedup'd), so two
    /// operations touching the same pair of dates cannot deadlock.
    pub(super) async fn lock_dates(&self, mut dates: Vec<NaiveDate>) -> Vec<OwnedMutexGuard<()>> {
        dates.sort();
        dates.dedup();
        let mut guards = Vec::with_capacity(dates.len());
        for date in dates {
            guards.push(self.date_lock(date).lock_owned().await);
        }
        guards
    }

    /// Fetch a slot and take its date lock, re-reading until the date
    /// seen before locking still holds (an update may move a slot to a
    /// different date between fetch and lock).
    pub(super) async fn lock_slot_date(
        &self,
        slot_id: Ulid,
    ) -> Result<(OwnedMutexGuard<()>, Slot), ScheduleError> {
        loop {
            let slot = self
                .storage
                .slot(slot_id)
                .await?
                .ok_or(ScheduleError::NotFound(Entity::Slot, slot_id))?;
            let guard = self.date_lock(slot.date).lock_owned().await;
            let fresh = self
                .storage
                .slot(slot_id)
                .await?
                .ok_or(ScheduleError::NotFound(Entity::Slot, slot_id))?;
            if fresh.date == slot.date {
                return Ok((guard, fresh));
            }
        }
    }
}
