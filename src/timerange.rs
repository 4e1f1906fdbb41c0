use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A wall-clock time of day, stored as minutes since midnight.
///
/// Parsed from and rendered as the 12-hour form `H:MM AM/PM`
/// (case-insensitive, optional leading zero on the hour, optional
/// single space before the period).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < 24 * 60).then_some(Self(minutes))
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn to_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.0 / 60, self.0 % 60, 0).expect("minutes below 1440")
    }
}

impl FromStr for ClockTime {
    type Err = ParseTimeError;

    fn from_str(raw: &str) -> Result<Self, ParseTimeError> {
        let err = || ParseTimeError { input: raw.to_string() };
        let s = raw.trim();
        let split = s.len().checked_sub(2).filter(|i| s.is_char_boundary(*i));
        let (time_part, period) = match split {
            Some(i) => s.split_at(i),
            None => return Err(err()),
        };
        let offset = match period.to_ascii_uppercase().as_str() {
            "AM" => 0,
            "PM" => 12 * 60,
            _ => return Err(err()),
        };
        // At most one space between the minutes and the period.
        let time_part = time_part.strip_suffix(' ').unwrap_or(time_part);
        let (h_str, m_str) = time_part.split_once(':').ok_or_else(|| err())?;
        if h_str.is_empty() || h_str.len() > 2 || m_str.len() != 2 {
            return Err(err());
        }
        let hour: u32 = h_str.parse().map_err(|_| err())?;
        let minute: u32 = m_str.parse().map_err(|_| err())?;
        if !(1..=12).contains(&hour) || minute > 59 {
            return Err(err());
        }
        Ok(Self((hour % 12) * 60 + minute + offset))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour = self.0 / 60;
        let minute = self.0 % 60;
        let period = if hour >= 12 { "PM" } else { "AM" };
        let hour12 = match hour % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{hour12}:{minute:02} {period}")
    }
}

impl fmt::Debug for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The input did not match `H:MM AM/PM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError {
    input: String,
}

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time {:?}: expected H:MM AM/PM", self.input)
    }
}

impl std::error::Error for ParseTimeError {}

/// Closed interval of a single day's clock, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeRange {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        debug_assert!(start < end, "TimeRange start must precede end");
        Self { start, end }
    }

    /// Conflict test: two ranges collide if they share any instant,
    /// including an exact boundary touch. A lab cannot be handed over
    /// at the very instant another session ends, so adjacency counts.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns true if `self` fully contains `other`.
    #[allow(dead_code)]
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::new(t(start), t(end))
    }

    #[test]
    fn parse_basics() {
        assert_eq!(t("9:00 AM").minutes(), 9 * 60);
        assert_eq!(t("09:00 AM").minutes(), 9 * 60);
        assert_eq!(t("12:00 AM").minutes(), 0);
        assert_eq!(t("12:00 PM").minutes(), 12 * 60);
        assert_eq!(t("12:30 AM").minutes(), 30);
        assert_eq!(t("11:59 PM").minutes(), 23 * 60 + 59);
        assert_eq!(t("1:05 pm").minutes(), 13 * 60 + 5);
    }

    #[test]
    fn parse_space_optional() {
        assert_eq!(t("9:00AM"), t("9:00 AM"));
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in [
            "",
            "9:00",
            "13:00 PM",
            "0:30 AM",
            "00:30 AM",
            "9:60 AM",
            "9:5 AM",
            "9.00 AM",
            "9:00 XM",
            "9:00  AM",
            "900 AM",
        ] {
            assert!(bad.parse::<ClockTime>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn display_roundtrip() {
        for s in ["9:00 AM", "12:00 AM", "12:00 PM", "11:59 PM", "1:05 PM"] {
            assert_eq!(t(s).to_string(), s);
        }
        // Non-canonical inputs render canonically.
        assert_eq!(t("09:00am").to_string(), "9:00 AM");
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = range("9:00 AM", "10:00 AM");
        let b = range("9:30 AM", "10:30 AM");
        let c = range("11:00 AM", "12:00 PM");
        assert_eq!(a.overlaps(&b), b.overlaps(&a));
        assert_eq!(a.overlaps(&c), c.overlaps(&a));
    }

    #[test]
    fn touching_endpoints_conflict() {
        let morning = range("9:00 AM", "10:00 AM");
        let next = range("10:00 AM", "11:00 AM");
        assert!(morning.overlaps(&next));
    }

    #[test]
    fn containment_conflicts() {
        let outer = range("9:00 AM", "12:00 PM");
        let inner = range("10:00 AM", "11:00 AM");
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn identical_ranges_conflict() {
        let a = range("9:00 AM", "10:00 AM");
        assert!(a.overlaps(&a));
    }

    #[test]
    fn gap_of_one_minute_does_not_conflict() {
        let a = range("9:00 AM", "10:00 AM");
        let b = range("10:01 AM", "11:00 AM");
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }
}
