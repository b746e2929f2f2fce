use chrono::{Days, Months, NaiveDate};
use uuid::Uuid;

use crate::model::{Event, RecurrencePattern};

// ---------------------------------------------------------------------------
// Occurrence dates
// ---------------------------------------------------------------------------

/// Dates of a recurring series, from `start` through `until` inclusive.
///
/// Each date steps from the previous occurrence. A monthly series started on
/// the 31st clamps to the end of a short month and stays on that day after.
/// Clone before iterating to walk the same series again.
#[derive(Debug, Clone)]
pub struct OccurrenceDates {
    next: Option<NaiveDate>,
    pattern: RecurrencePattern,
    until: NaiveDate,
}

impl OccurrenceDates {
    pub fn new(start: NaiveDate, pattern: RecurrencePattern, until: NaiveDate) -> Self {
        OccurrenceDates {
            next: Some(start),
            pattern,
            until,
        }
    }

    fn step(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.pattern {
            RecurrencePattern::Daily => date.checked_add_days(Days::new(1)),
            RecurrencePattern::Weekly => date.checked_add_days(Days::new(7)),
            RecurrencePattern::Biweekly => date.checked_add_days(Days::new(14)),
            RecurrencePattern::Monthly => date.checked_add_months(Months::new(1)),
        }
    }
}

impl Iterator for OccurrenceDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let date = self.next.filter(|d| *d <= self.until)?;
        self.next = self.step(date);
        Some(date)
    }
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

pub fn new_series_id() -> String {
    format!("series_{}", Uuid::new_v4().simple())
}

/// Expand `base` into one event per occurrence under a fresh series id.
///
/// Returns an empty vector when `until` is before the base date; callers must
/// treat that as invalid input rather than "nothing to create".
pub fn expand(base: &Event, pattern: RecurrencePattern, until: NaiveDate) -> Vec<Event> {
    expand_with_series_id(base, pattern, until, &new_series_id())
}

/// Same as [`expand`] with a caller-chosen series id.
///
/// Occurrences are copies of `base` moved to their date, with no id, zero
/// registrations, the shared `series_id`, and no recurrence settings of
/// their own. Occurrences are not checked against each other.
pub fn expand_with_series_id(
    base: &Event,
    pattern: RecurrencePattern,
    until: NaiveDate,
    series_id: &str,
) -> Vec<Event> {
    OccurrenceDates::new(base.schedule.date(), pattern, until)
        .map(|date| Event {
            id: String::new(),
            schedule: base.schedule.on_date(date),
            registered_count: 0,
            series_id: Some(series_id.to_string()),
            is_recurring: false,
            recurrence_pattern: None,
            recurrence_end_date: None,
            ..base.clone()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
