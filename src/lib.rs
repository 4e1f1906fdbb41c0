//! Slot/booking consistency engine for institutional lab scheduling.
//!
//! Administrators define labs and bookable time slots; faculty reserve
//! slots. The crate owns the rules that decide whether a slot or
//! booking mutation is legal, how slot status derives from bookings,
//! and how time-boundary conflicts are detected across the whole
//! calendar. Time, persistence, and notification delivery are injected
//! collaborators ([`clock::Clock`], [`storage::Storage`],
//! [`notify::Notifier`]).

pub mod clock;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod service;
pub mod storage;
pub mod sweeper;
pub mod timerange;

pub use service::error::ScheduleError;
pub use service::{Actor, ScheduleConfig, SchedulingService};
