use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

// ---------------------------------------------------------------------------
// Date / time parsing helpers
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S"];

/// Parse an ISO 8601-ish date-time as wall-clock time.
///
/// Trailing `Z` and `+HH:MM` / `-HH:MM` offsets are stripped rather than
/// applied: booking times are calendar-local. A bare `YYYY-MM-DD` parses as
/// midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    let s = strip_offset(s);

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// Offsets only ever follow the time part, which starts after the 10-byte date.
fn strip_offset(s: &str) -> &str {
    let s = s.trim_end_matches('Z');
    match s.get(10..).and_then(|time| time.rfind(['+', '-'])) {
        Some(pos) => &s[..10 + pos],
        None => s,
    }
}

/// Parse a zero-padded `HH:MM` (seconds tolerated) time of day.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Serde adapter for `HH:MM` times of day.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}

/// Serde adapter for date-times in any of the shapes `parse_datetime` accepts.
pub mod lenient {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_datetime(*dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_datetime(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid date-time '{}'", raw)))
    }

    /// Same as the parent module, for optional fields.
    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<NaiveDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.serialize_some(&super::super::format_datetime(*dt)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) => super::super::parse_datetime(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid date-time '{}'", raw))),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TimeWindow
// ---------------------------------------------------------------------------

/// Half-open interval `[start, end)` of wall-clock time.
///
/// The plain constructor does not check `start < end`; that belongs to
/// validation. `on_day` does check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "lenient")]
    pub start: NaiveDateTime,
    #[serde(with = "lenient")]
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub const fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        TimeWindow { start, end }
    }

    /// Build a window from a calendar day and two `HH:MM` strings.
    pub fn on_day(date: NaiveDate, start: &str, end: &str) -> Result<Self, BookingError> {
        let start_t = parse_time(start).ok_or_else(|| {
            BookingError::validation(format!("Start time '{}' is not a valid HH:MM time", start))
        })?;
        let end_t = parse_time(end).ok_or_else(|| {
            BookingError::validation(format!("End time '{}' is not a valid HH:MM time", end))
        })?;
        if start_t >= end_t {
            return Err(BookingError::validation("End time must be after start time"));
        }
        Ok(TimeWindow::new(date.and_time(start_t), date.and_time(end_t)))
    }

    /// Calendar day the window belongs to (its start's date).
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn is_positive(&self) -> bool {
        self.start < self.end
    }

    /// Strict half-open overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Overlap restricted to windows on the same calendar day. Windows that
    /// start on different days never overlap under this rule.
    pub fn overlaps_same_day(&self, other: &TimeWindow) -> bool {
        self.date() == other.date() && self.overlaps(other)
    }

}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.date() == self.end.date() {
            write!(
                f,
                "{} {}-{}",
                self.start.format("%Y-%m-%d"),
                self.start.format("%H:%M"),
                self.end.format("%H:%M")
            )
        } else {
            write!(
                f,
                "{} to {}",
                self.start.format("%Y-%m-%d %H:%M"),
                self.end.format("%Y-%m-%d %H:%M")
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
