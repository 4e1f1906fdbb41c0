use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::timerange::ClockTime;

const CHANNEL_CAPACITY: usize = 256;

/// Payload handed to the external notification collaborator when a
/// booking is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingNotice {
    pub booking: Ulid,
    pub faculty: Ulid,
    pub lab: Ulid,
    pub lab_name: String,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Best-effort delivery seam (the production system sends email here).
/// A failure is logged by the caller and never rolls back the booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_booking_created(&self, notice: &BookingNotice) -> Result<(), NotifyError>;
}

/// Emits the notice as a JSON line on the log stream. Default when no
/// real delivery channel is wired up.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_booking_created(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notice).map_err(|e| NotifyError(e.to_string()))?;
        tracing::info!(target: "labsched::notify", %payload, "booking confirmed");
        Ok(())
    }
}

/// Discards every notice.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_booking_created(&self, _notice: &BookingNotice) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// In-process schedule change feed, keyed by lab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEvent {
    SlotAdded { slot: Ulid, lab: Ulid, date: NaiveDate },
    SlotUpdated { slot: Ulid, lab: Ulid },
    SlotCancelled { slot: Ulid, lab: Ulid },
    SlotRestored { slot: Ulid, lab: Ulid },
    SlotDeleted { slot: Ulid, lab: Ulid },
    SlotCompleted { slot: Ulid, lab: Ulid },
    BookingCreated { booking: Ulid, slot: Ulid, lab: Ulid, faculty: Ulid },
    BookingCancelled { booking: Ulid, slot: Ulid, lab: Ulid },
}

/// Broadcast hub for schedule events, one channel per lab.
pub struct EventHub {
    channels: DashMap<Ulid, broadcast::Sender<ScheduleEvent>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to events for a lab. Creates the channel if needed.
    pub fn subscribe(&self, lab: Ulid) -> broadcast::Receiver<ScheduleEvent> {
        let sender = self
            .channels
            .entry(lab)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, lab: Ulid, event: &ScheduleEvent) {
        if let Some(sender) = self.channels.get(&lab) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a lab is deleted).
    #[allow(dead_code)]
    pub fn remove(&self, lab: &Ulid) {
        self.channels.remove(lab);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = EventHub::new();
        let lab = Ulid::new();
        let mut rx = hub.subscribe(lab);

        let event = ScheduleEvent::SlotCancelled { slot: Ulid::new(), lab };
        hub.send(lab, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = EventHub::new();
        let lab = Ulid::new();
        // No subscriber: should not panic
        hub.send(lab, &ScheduleEvent::SlotDeleted { slot: Ulid::new(), lab });
    }

    #[tokio::test]
    async fn log_notifier_accepts_notice() {
        let notice = BookingNotice {
            booking: Ulid::new(),
            faculty: Ulid::new(),
            lab: Ulid::new(),
            lab_name: "Chemistry Lab".into(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            start_time: "9:00 AM".parse().unwrap(),
            end_time: "10:00 AM".parse().unwrap(),
        };
        LogNotifier.notify_booking_created(&notice).await.unwrap();
    }
}
