use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::window::{self, TimeWindow};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What a booking (or cart item) is for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    Event,
    Resource,
}

/// Booking lifecycle status. `Rejected` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Active,
    Inactive,
    Cancelled,
}

/// Step between occurrences of a recurring event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    #[default]
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    User,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The user performing an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Bookings record their creator by id or by email depending on the
    /// backend; either matches.
    pub fn owns(&self, booking: &Booking) -> bool {
        booking
            .created_by
            .as_deref()
            .is_some_and(|who| who == self.id || who == self.email)
    }
}

// ---------------------------------------------------------------------------
// Schedule: the two time shapes the backend uses
// ---------------------------------------------------------------------------

/// When a booking or event takes place.
///
/// Records either carry a calendar day plus `HH:MM` times, or a pair of full
/// date-times. Both flatten into the owning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schedule {
    Timed {
        date: NaiveDate,
        #[serde(with = "window::hhmm")]
        start_time: NaiveTime,
        #[serde(with = "window::hhmm")]
        end_time: NaiveTime,
    },
    Span {
        #[serde(with = "window::lenient")]
        start_date: NaiveDateTime,
        #[serde(with = "window::lenient")]
        end_date: NaiveDateTime,
    },
}

impl Schedule {
    /// Same-day windows become `Timed`, anything else a `Span`.
    pub fn from_window(w: &TimeWindow) -> Schedule {
        if w.start.date() == w.end.date() {
            Schedule::Timed {
                date: w.start.date(),
                start_time: w.start.time(),
                end_time: w.end.time(),
            }
        } else {
            Schedule::Span {
                start_date: w.start,
                end_date: w.end,
            }
        }
    }

    pub fn window(&self) -> TimeWindow {
        match self {
            Schedule::Timed {
                date,
                start_time,
                end_time,
            } => TimeWindow::new(date.and_time(*start_time), date.and_time(*end_time)),
            Schedule::Span {
                start_date,
                end_date,
            } => TimeWindow::new(*start_date, *end_date),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.window().date()
    }

    /// The same schedule moved so that it starts on `date`, keeping times of
    /// day and duration.
    pub fn on_date(&self, date: NaiveDate) -> Schedule {
        match self {
            Schedule::Timed {
                start_time,
                end_time,
                ..
            } => Schedule::Timed {
                date,
                start_time: *start_time,
                end_time: *end_time,
            },
            Schedule::Span {
                start_date,
                end_date,
            } => {
                let delta: Duration = date - start_date.date();
                Schedule::Span {
                    start_date: *start_date + delta,
                    end_date: *end_date + delta,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

/// One commitment: an event registration or a resource reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    #[serde(default)]
    pub id: String,
    pub booking_type: BookingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(
        default,
        with = "window::lenient::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub approval_date: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub approval_required: bool,
    /// Display hint some backend list endpoints join in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    /// Display hint some backend list endpoints join in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl Booking {
    fn blank(booking_type: BookingType, window: &TimeWindow) -> Booking {
        Booking {
            id: String::new(),
            booking_type,
            event_id: None,
            resource_id: None,
            schedule: Schedule::from_window(window),
            status: BookingStatus::Pending,
            purpose: None,
            notes: None,
            created_by: None,
            approved_by: None,
            approval_date: None,
            rejection_reason: None,
            total_price: 0.0,
            approval_required: false,
            event_title: None,
            resource_name: None,
        }
    }

    /// A new, unsaved `pending` reservation of `resource_id`.
    pub fn for_resource(resource_id: impl Into<String>, window: &TimeWindow) -> Booking {
        Booking {
            resource_id: Some(resource_id.into()),
            ..Booking::blank(BookingType::Resource, window)
        }
    }

    /// A new, unsaved `pending` registration for `event_id`.
    pub fn for_event(event_id: impl Into<String>, window: &TimeWindow) -> Booking {
        Booking {
            event_id: Some(event_id.into()),
            ..Booking::blank(BookingType::Event, window)
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.schedule.window()
    }

    /// The id of whatever this booking targets, when exactly one target is
    /// set and it matches `booking_type`.
    pub fn target_id(&self) -> Option<&str> {
        match (self.booking_type, &self.event_id, &self.resource_id) {
            (BookingType::Event, Some(id), None) => Some(id),
            (BookingType::Resource, None, Some(id)) => Some(id),
            _ => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// Partial update sent to the backend after a lifecycle transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(
        default,
        with = "window::lenient::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub approval_date: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl BookingPatch {
    /// The lifecycle-owned fields of `booking`, as they are now.
    pub fn lifecycle_of(booking: &Booking) -> BookingPatch {
        BookingPatch {
            status: Some(booking.status),
            approved_by: booking.approved_by.clone(),
            approval_date: booking.approval_date,
            rejection_reason: booking.rejection_reason.clone(),
        }
    }

    pub fn apply_to(&self, booking: &mut Booking) {
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(by) = &self.approved_by {
            booking.approved_by = Some(by.clone());
        }
        if let Some(at) = self.approval_date {
            booking.approval_date = Some(at);
        }
        if let Some(reason) = &self.rejection_reason {
            booking.rejection_reason = Some(reason.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A scheduled event with capacity, optionally part of a recurring series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub registered_count: u32,
    #[serde(default)]
    pub ticket_price: f64,
    #[serde(default)]
    pub status: EventStatus,
    /// Resources this event occupies for its whole window.
    #[serde(default)]
    pub assigned_resource_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_pattern: Option<RecurrencePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Event {
    pub fn window(&self) -> TimeWindow {
        self.schedule.window()
    }

    pub fn uses_resource(&self, resource_id: &str) -> bool {
        self.assigned_resource_ids.iter().any(|r| r == resource_id)
    }
}

/// Partial update for an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPatch {
    /// Registration count sync after a booking is created or cancelled.
    RegisteredCount(u32),
    /// Full replacement of the editable fields (admin edit).
    Details(Box<Event>),
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A bookable room, piece of equipment, vehicle, ...
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub daily_price: f64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

/// A prospective booking staged client-side before checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(rename = "type")]
    pub kind: BookingType,
    pub item_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// `YYYY-MM-DD` for resources, the event's start date-time for events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_day: Option<f64>,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CartItem {
    /// Stage a reservation of `resource` on `date` between two `HH:MM` times.
    /// A booking costs the resource's daily price.
    pub fn for_resource(
        resource: &Resource,
        date: NaiveDate,
        start_time: &str,
        end_time: &str,
    ) -> CartItem {
        CartItem {
            kind: BookingType::Resource,
            item_id: resource.id.clone(),
            name: resource.name.clone(),
            image: resource.image_url.clone(),
            start_date: Some(date.format("%Y-%m-%d").to_string()),
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
            price_per_day: Some(resource.daily_price),
            total_price: resource.daily_price,
            purpose: None,
            notes: None,
        }
    }

    /// Stage a ticket for `event`.
    pub fn for_event(event: &Event) -> CartItem {
        CartItem {
            kind: BookingType::Event,
            item_id: event.id.clone(),
            name: event.title.clone(),
            image: event.image_url.clone(),
            start_date: Some(window::format_datetime(event.window().start)),
            start_time: None,
            end_time: None,
            price_per_day: None,
            total_price: event.ticket_price,
            purpose: None,
            notes: None,
        }
    }

    pub fn with_purpose(mut self, purpose: Option<String>, notes: Option<String>) -> CartItem {
        self.purpose = purpose;
        self.notes = notes;
        self
    }

    /// Two items describe the same slot when type, target and all three
    /// date/time fields match.
    pub fn same_slot(&self, other: &CartItem) -> bool {
        self.kind == other.kind
            && self.item_id == other.item_id
            && self.start_date == other.start_date
            && self.start_time == other.start_time
            && self.end_time == other.end_time
    }

    /// The day this item is for, if it carries one.
    pub fn date(&self) -> Option<NaiveDate> {
        self.start_date
            .as_deref()
            .and_then(window::parse_datetime)
            .map(|dt| dt.date())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
