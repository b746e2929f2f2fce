use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::{Booking, BookingStatus, Event, Resource};

pub const UNKNOWN: &str = "Unknown";

// ---------------------------------------------------------------------------
// Display fallbacks
// ---------------------------------------------------------------------------

/// Display name for a booking. First present, non-empty candidate wins:
/// the joined `event_title`, the joined `resource_name`, the target event's
/// title, the target resource's name.
pub fn display_name<'a>(
    booking: &'a Booking,
    event: Option<&'a Event>,
    resource: Option<&'a Resource>,
) -> &'a str {
    [
        booking.event_title.as_deref(),
        booking.resource_name.as_deref(),
        event.map(|e| e.title.as_str()),
        resource.map(|r| r.name.as_str()),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty())
    .unwrap_or(UNKNOWN)
}

/// Where a booking takes place: the event's location, else the resource's.
pub fn display_location<'a>(event: Option<&'a Event>, resource: Option<&'a Resource>) -> &'a str {
    [
        event.map(|e| e.location.as_str()),
        resource.map(|r| r.location.as_str()),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty())
    .unwrap_or(UNKNOWN)
}

/// Resolve a booking's target against catalog snapshots.
pub fn lookup<'a>(
    booking: &Booking,
    events: &'a [Event],
    resources: &'a [Resource],
) -> (Option<&'a Event>, Option<&'a Resource>) {
    let event = booking
        .event_id
        .as_deref()
        .and_then(|id| events.iter().find(|e| e.id == id));
    let resource = booking
        .resource_id
        .as_deref()
        .and_then(|id| resources.iter().find(|r| r.id == id));
    (event, resource)
}

/// A booking with its resolved display name and location.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView<'a> {
    pub booking: &'a Booking,
    pub display_name: &'a str,
    pub display_location: &'a str,
}

pub fn describe<'a>(
    booking: &'a Booking,
    events: &'a [Event],
    resources: &'a [Resource],
) -> BookingView<'a> {
    let (event, resource) = lookup(booking, events, resources);
    BookingView {
        booking,
        display_name: display_name(booking, event, resource),
        display_location: display_location(event, resource),
    }
}

// ---------------------------------------------------------------------------
// Owner buckets
// ---------------------------------------------------------------------------

/// A user's bookings grouped for the "my bookings" views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingBuckets<T> {
    /// Confirmed and not yet over.
    pub active: Vec<T>,
    /// Confirmed and already ended.
    pub past: Vec<T>,
    pub cancelled: Vec<T>,
}

impl<T> BookingBuckets<T> {
    pub fn map<U>(self, f: impl Fn(T) -> U) -> BookingBuckets<U> {
        BookingBuckets {
            active: self.active.into_iter().map(&f).collect(),
            past: self.past.into_iter().map(&f).collect(),
            cancelled: self.cancelled.into_iter().map(&f).collect(),
        }
    }
}

/// Split bookings by status and by whether they ended before `now`.
/// Pending and rejected bookings go in no bucket.
pub fn partition_bookings(bookings: &[Booking], now: NaiveDateTime) -> BookingBuckets<&Booking> {
    let mut buckets = BookingBuckets {
        active: Vec::new(),
        past: Vec::new(),
        cancelled: Vec::new(),
    };
    for b in bookings {
        match b.status {
            BookingStatus::Confirmed if b.window().end >= now => buckets.active.push(b),
            BookingStatus::Confirmed => buckets.past.push(b),
            BookingStatus::Cancelled => buckets.cancelled.push(b),
            BookingStatus::Pending | BookingStatus::Rejected => {}
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, event, event_booking, resource, resource_booking, window};

    #[test]
    fn name_precedence() {
        let w = window("2026-03-10", "09:00", "10:00");
        let ev = event("ev-1", "2026-03-10", "09:00", "10:00", &[]);
        let room = resource("room", "Room 1");
        let mut b = event_booking("b1", "ev-1", w, BookingStatus::Confirmed);

        assert_eq!(display_name(&b, None, None), UNKNOWN);
        assert_eq!(display_name(&b, None, Some(&room)), "Room 1");
        assert_eq!(display_name(&b, Some(&ev), Some(&room)), "Event ev-1");
        b.resource_name = Some("Joined room".to_string());
        assert_eq!(display_name(&b, Some(&ev), Some(&room)), "Joined room");
        b.event_title = Some(String::new());
        assert_eq!(display_name(&b, Some(&ev), Some(&room)), "Joined room");
        b.event_title = Some("Joined title".to_string());
        assert_eq!(display_name(&b, Some(&ev), Some(&room)), "Joined title");
    }

    #[test]
    fn location_and_lookup() {
        let w = window("2026-03-10", "09:00", "10:00");
        let events = vec![event("ev-1", "2026-03-10", "09:00", "10:00", &[])];
        let resources = vec![resource("room", "Room 1")];
        let b = resource_booking("b1", "room", w, BookingStatus::Confirmed);

        let (ev, res) = lookup(&b, &events, &resources);
        assert!(ev.is_none());
        assert_eq!(res.map(|r| r.id.as_str()), Some("room"));
        assert_eq!(display_location(ev, res), "Building A");
        assert_eq!(display_location(None, None), UNKNOWN);
    }

    fn booking_at(id: &str, date: &str, start: &str, end: &str, status: BookingStatus) -> Booking {
        resource_booking(id, "room", window(date, start, end), status)
    }

    #[test]
    fn buckets_split_on_end_time() {
        let bookings = vec![
            booking_at("past", "2026-03-10", "08:00", "09:00", BookingStatus::Confirmed),
            booking_at("now", "2026-03-10", "09:00", "10:00", BookingStatus::Confirmed),
            booking_at("gone", "2026-03-11", "09:00", "10:00", BookingStatus::Cancelled),
            booking_at("wait", "2026-03-11", "09:00", "10:00", BookingStatus::Pending),
        ];
        let buckets = partition_bookings(&bookings, at("2026-03-10T09:30:00"));
        let ids = |v: &[&Booking]| v.iter().map(|b| b.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&buckets.active), vec!["now"]);
        assert_eq!(ids(&buckets.past), vec!["past"]);
        assert_eq!(ids(&buckets.cancelled), vec!["gone"]);
    }

    #[test]
    fn described_buckets_carry_names_and_locations() {
        let events = vec![event("ev-1", "2026-03-12", "18:00", "20:00", &[])];
        let resources = vec![resource("room", "Room 1")];
        let bookings = vec![
            booking_at("b1", "2026-03-12", "09:00", "10:00", BookingStatus::Confirmed),
            event_booking(
                "b2",
                "ev-1",
                window("2026-03-12", "18:00", "20:00"),
                BookingStatus::Cancelled,
            ),
        ];

        let buckets = partition_bookings(&bookings, at("2026-03-10T09:30:00"))
            .map(|b| describe(b, &events, &resources));
        assert_eq!(buckets.active[0].display_name, "Room 1");
        assert_eq!(buckets.active[0].display_location, "Building A");
        assert_eq!(buckets.cancelled[0].booking.id, "b2");
        assert_eq!(buckets.cancelled[0].display_name, "Event ev-1");
        assert!(buckets.past.is_empty());
    }
}
