use std::collections::HashSet;

use serde::Serialize;

use crate::error::BookingError;
use crate::model::{Booking, BookingType, Event, Resource};

// ---------------------------------------------------------------------------
// Validation result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn blocking errors into a `BookingError::Validation`, dropping
    /// warnings.
    pub fn into_result(self) -> Result<(), BookingError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BookingError::Validation(self.errors))
        }
    }
}

// ---------------------------------------------------------------------------
// Event drafts
// ---------------------------------------------------------------------------

/// Validate an event draft before it is saved, returning errors (block the
/// save) and warnings (advisory). Errors are listed before warnings.
pub fn validate_event(draft: &Event, resources: &[Resource]) -> ValidationResult {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    // -----------------------------------------------------------------------
    // Required fields
    // -----------------------------------------------------------------------
    if draft.title.trim().is_empty() {
        errors.push("Event has no title -- a title is required".to_string());
    }
    if draft.location.trim().is_empty() {
        errors.push(format!(
            "Event '{}' has no location -- a location is required",
            draft.title
        ));
    }

    // -----------------------------------------------------------------------
    // Timing
    // -----------------------------------------------------------------------
    let window = draft.window();
    if !window.is_positive() {
        errors.push(format!(
            "Event '{}' ends before it starts -- end time must be after start time",
            draft.title
        ));
    }

    // -----------------------------------------------------------------------
    // Capacity and price
    // -----------------------------------------------------------------------
    if draft.capacity == 0 {
        errors.push(format!(
            "Event '{}' has no capacity -- at least one seat is required",
            draft.title
        ));
    }
    if !draft.ticket_price.is_finite() || draft.ticket_price < 0.0 {
        errors.push(format!(
            "Event '{}' has an invalid ticket price -- price cannot be negative",
            draft.title
        ));
    }

    // -----------------------------------------------------------------------
    // Recurrence
    // -----------------------------------------------------------------------
    if draft.is_recurring {
        match draft.recurrence_end_date {
            None => errors.push(format!(
                "Event '{}' repeats but has no end date -- recurring events need one",
                draft.title
            )),
            Some(until) if until < window.date() => errors.push(format!(
                "Event '{}' repeats until {} which is before its first date {}",
                draft.title,
                until,
                window.date()
            )),
            Some(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Assigned resources
    // -----------------------------------------------------------------------
    {
        let mut seen: HashSet<&str> = HashSet::new();
        for resource_id in &draft.assigned_resource_ids {
            if !seen.insert(resource_id.as_str()) {
                warnings.push(format!(
                    "Resource '{}' is assigned twice -- it will only be reserved once",
                    resource_id
                ));
                continue;
            }
            match resources.iter().find(|r| r.id == *resource_id) {
                None => errors.push(format!(
                    "Event '{}' uses resource '{}' which doesn't exist",
                    draft.title, resource_id
                )),
                Some(r) if !r.available => warnings.push(format!(
                    "Resource '{}' is marked unavailable -- check before scheduling",
                    r.name
                )),
                Some(_) => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Warnings
    // -----------------------------------------------------------------------
    if draft.registered_count > draft.capacity {
        warnings.push(format!(
            "Event '{}' already has {} registrations for {} seats -- it is overbooked",
            draft.title, draft.registered_count, draft.capacity
        ));
    }

    ValidationResult { errors, warnings }
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

/// Structural checks for a booking about to be created.
pub fn validate_booking(booking: &Booking) -> ValidationResult {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if booking.target_id().is_none() {
        let target = match booking.booking_type {
            BookingType::Event => "event",
            BookingType::Resource => "resource",
        };
        errors.push(format!(
            "A {target} booking needs exactly one {target} id and nothing else"
        ));
    }

    if !booking.window().is_positive() {
        errors.push(
            "Booking ends before it starts -- end time must be after start time".to_string(),
        );
    }

    if !booking.total_price.is_finite() || booking.total_price < 0.0 {
        errors.push("Booking has a negative total price".to_string());
    }

    if booking.created_by.is_none() {
        warnings.push("Booking has no owner -- only admins will be able to cancel it".to_string());
    }

    ValidationResult { errors, warnings }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, day, event, resource, resource_booking, window};
    use crate::model::{BookingStatus, Schedule};

    #[test]
    fn well_formed_event_passes() {
        let ev = event("", "2026-03-10", "09:00", "11:00", &["hall"]);
        let result = validate_event(&ev, &[resource("hall", "Main Hall")]);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn missing_fields_and_bad_numbers_are_errors() {
        let mut ev = event("", "2026-03-10", "09:00", "11:00", &[]);
        ev.schedule = Schedule::Span {
            start_date: at("2026-03-10T11:00"),
            end_date: at("2026-03-10T09:00"),
        };
        ev.title = "  ".to_string();
        ev.location = String::new();
        ev.capacity = 0;
        ev.ticket_price = -5.0;
        let result = validate_event(&ev, &[]);
        assert_eq!(result.errors.len(), 5);

        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn recurring_event_needs_an_end_date_on_or_after_start() {
        let mut ev = event("", "2026-03-10", "09:00", "10:00", &[]);
        ev.is_recurring = true;
        assert_eq!(validate_event(&ev, &[]).errors.len(), 1);

        ev.recurrence_end_date = Some(day("2026-03-09"));
        assert!(validate_event(&ev, &[]).errors[0].contains("before its first date"));

        ev.recurrence_end_date = Some(day("2026-03-10"));
        assert!(validate_event(&ev, &[]).is_ok());
    }

    #[test]
    fn unknown_resources_block_and_unavailable_ones_warn() {
        let mut closed = resource("van", "Van");
        closed.available = false;
        let ev = event("", "2026-03-10", "09:00", "10:00", &["van", "ghost", "van"]);
        let result = validate_event(&ev, &[closed]);

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("ghost"));
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn overbooked_event_is_a_warning() {
        let mut ev = event("ev-1", "2026-03-10", "09:00", "10:00", &[]);
        ev.capacity = 2;
        ev.registered_count = 3;
        let result = validate_event(&ev, &[]);
        assert!(result.is_ok());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn booking_needs_a_single_target() {
        let mut b = resource_booking(
            "",
            "room",
            window("2026-03-10", "09:00", "10:00"),
            BookingStatus::Pending,
        );
        assert!(validate_booking(&b).is_ok());

        b.event_id = Some("ev-1".to_string());
        let result = validate_booking(&b);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("A resource booking"));

        b.event_id = None;
        b.created_by = None;
        assert_eq!(validate_booking(&b).warnings.len(), 1);
    }
}
