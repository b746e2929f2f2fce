use std::fmt;

use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::{find_conflicts, Commitment, OverlapRule, Scope};
use crate::error::BookingError;
use crate::model::{Actor, Booking, BookingStatus, BookingType};

pub const DEFAULT_CANCELLATION_CUTOFF_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" in calendar-local wall time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Approve,
    Reject,
    Cancel,
}

impl Transition {
    /// The only status this transition may start from.
    pub fn from_status(self) -> BookingStatus {
        match self {
            Transition::Approve | Transition::Reject => BookingStatus::Pending,
            Transition::Cancel => BookingStatus::Confirmed,
        }
    }

    pub fn to_status(self) -> BookingStatus {
        match self {
            Transition::Approve => BookingStatus::Confirmed,
            Transition::Reject => BookingStatus::Rejected,
            Transition::Cancel => BookingStatus::Cancelled,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
        })
    }
}

/// Status a new booking starts in.
pub fn initial_status(approval_required: bool) -> BookingStatus {
    if approval_required {
        BookingStatus::Pending
    } else {
        BookingStatus::Confirmed
    }
}

fn ensure_from(booking: &Booking, transition: Transition) -> Result<(), BookingError> {
    if booking.status != transition.from_status() {
        return Err(BookingError::InvalidTransition {
            from: booking.status,
            action: transition,
        });
    }
    Ok(())
}

fn require_admin(actor: &Actor, what: &str) -> Result<(), BookingError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(BookingError::Forbidden(what.to_string()))
    }
}

/// Confirm a pending booking.
///
/// `bookings` is the current snapshot for the calendar; only its confirmed
/// entries block. A resource booking that would overlap another confirmed
/// booking for the same resource is refused with a conflict, never approved.
pub fn approve(
    booking: &mut Booking,
    approver: &Actor,
    bookings: &[Booking],
    now: NaiveDateTime,
) -> Result<(), BookingError> {
    require_admin(approver, "approve bookings")?;
    ensure_from(booking, Transition::Approve)?;

    if booking.booking_type == BookingType::Resource {
        if let Some(resource_id) = booking.resource_id.clone() {
            let confirmed = bookings.iter().filter(|b| b.is_confirmed());
            let conflicts = find_conflicts(
                &booking.window(),
                &Scope::Resource(resource_id),
                confirmed,
                Some(booking.id.as_str()),
                OverlapRule::Timestamp,
            );
            if !conflicts.is_empty() {
                return Err(BookingError::conflict(
                    conflicts.into_iter().map(Commitment::to_ref).collect(),
                ));
            }
        }
    }

    booking.status = Transition::Approve.to_status();
    booking.approved_by = Some(approver.email.clone());
    booking.approval_date = Some(now);
    debug!(booking_id = %booking.id, approver = %approver.email, "booking approved");
    Ok(())
}

/// Reject a pending booking. The reason is required and stored trimmed.
pub fn reject(
    booking: &mut Booking,
    approver: &Actor,
    reason: &str,
    now: NaiveDateTime,
) -> Result<(), BookingError> {
    require_admin(approver, "reject bookings")?;
    ensure_from(booking, Transition::Reject)?;

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(BookingError::validation("A rejection reason is required"));
    }

    booking.status = Transition::Reject.to_status();
    booking.approved_by = Some(approver.email.clone());
    booking.approval_date = Some(now);
    booking.rejection_reason = Some(reason.to_string());
    debug!(booking_id = %booking.id, approver = %approver.email, "booking rejected");
    Ok(())
}

/// Whether a booking starting at `start` may be cancelled at `now`.
///
/// Only bookings starting strictly in the future and less than `cutoff` away
/// are locked. Bookings that already started or ended stay cancellable.
pub fn can_cancel(start: NaiveDateTime, now: NaiveDateTime, cutoff: Duration) -> bool {
    let until_start = start - now;
    until_start <= Duration::zero() || until_start >= cutoff
}

/// Cancel a confirmed booking on behalf of its owner or an admin.
pub fn cancel(
    booking: &mut Booking,
    actor: &Actor,
    now: NaiveDateTime,
    cutoff: Duration,
) -> Result<(), BookingError> {
    if !actor.is_admin() && !actor.owns(booking) {
        return Err(BookingError::Forbidden(
            "cancel someone else's booking".to_string(),
        ));
    }
    ensure_from(booking, Transition::Cancel)?;

    let start = booking.window().start;
    if !can_cancel(start, now, cutoff) {
        return Err(BookingError::CancellationWindowClosed {
            cutoff_hours: cutoff.num_hours(),
            minutes_until_start: (start - now).num_minutes(),
        });
    }

    booking.status = Transition::Cancel.to_status();
    debug!(booking_id = %booking.id, actor = %actor.email, "booking cancelled");
    Ok(())
}

/// Registration count after one registration is withdrawn, floored at zero.
pub fn registered_count_after_cancel(count: u32) -> u32 {
    count.saturating_sub(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{admin, at, event_booking, member, resource_booking, window};

    fn cutoff() -> Duration {
        Duration::hours(DEFAULT_CANCELLATION_CUTOFF_HOURS)
    }

    #[test]
    fn new_bookings_start_pending_only_when_approval_is_required() {
        assert_eq!(initial_status(true), BookingStatus::Pending);
        assert_eq!(initial_status(false), BookingStatus::Confirmed);
    }

    #[test]
    fn cancellation_window_boundaries() {
        let now = at("2026-03-09T09:00:00");
        let start_in = |mins: i64| now + Duration::minutes(mins);

        assert!(!can_cancel(start_in(23 * 60 + 59), now, cutoff()));
        assert!(can_cancel(start_in(24 * 60 + 1), now, cutoff()));
        assert!(can_cancel(start_in(24 * 60), now, cutoff()));
        assert!(can_cancel(start_in(-1), now, cutoff()));
        assert!(can_cancel(start_in(0), now, cutoff()));
        assert!(!can_cancel(start_in(1), now, cutoff()));
    }

    #[test]
    fn cancel_inside_cutoff_is_refused() {
        let mut b = resource_booking(
            "b1",
            "room",
            window("2026-03-10", "09:00", "10:00"),
            BookingStatus::Confirmed,
        );
        let now = at("2026-03-09T09:01:00");
        let err = cancel(&mut b, &member(), now, cutoff()).unwrap_err();
        assert!(matches!(
            err,
            BookingError::CancellationWindowClosed {
                cutoff_hours: 24,
                minutes_until_start: 1439
            }
        ));
        assert_eq!(b.status, BookingStatus::Confirmed);
    }

    #[test]
    fn past_bookings_can_be_cleaned_up() {
        let mut b = event_booking(
            "b1",
            "ev-1",
            window("2026-03-10", "09:00", "10:00"),
            BookingStatus::Confirmed,
        );
        cancel(&mut b, &member(), at("2026-03-10T09:01:00"), cutoff()).unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
    }

    #[test]
    fn only_owner_or_admin_may_cancel() {
        let mut b = resource_booking(
            "b1",
            "room",
            window("2026-03-20", "09:00", "10:00"),
            BookingStatus::Confirmed,
        );
        b.created_by = Some("someone-else@example.com".to_string());
        let now = at("2026-03-01T09:00:00");
        assert!(matches!(
            cancel(&mut b, &member(), now, cutoff()),
            Err(BookingError::Forbidden(_))
        ));
        cancel(&mut b, &admin(), now, cutoff()).unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
    }

    #[test]
    fn pending_bookings_cannot_be_cancelled() {
        let mut b = resource_booking(
            "b1",
            "room",
            window("2026-03-20", "09:00", "10:00"),
            BookingStatus::Pending,
        );
        let err = cancel(&mut b, &member(), at("2026-03-01T09:00:00"), cutoff()).unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Pending,
                action: Transition::Cancel
            }
        ));
    }

    #[test]
    fn approving_into_a_conflict_is_refused() {
        let w1 = window("2026-03-10", "09:00", "11:00");
        let w2 = window("2026-03-10", "10:00", "12:00");
        let mut bookings = vec![
            resource_booking("b1", "room", w1, BookingStatus::Pending),
            resource_booking("b2", "room", w2, BookingStatus::Pending),
        ];
        let now = at("2026-03-01T12:00:00");

        let mut first = bookings[0].clone();
        approve(&mut first, &admin(), &bookings, now).unwrap();
        assert_eq!(first.status, BookingStatus::Confirmed);
        assert_eq!(first.approved_by.as_deref(), Some("admin@example.com"));
        assert_eq!(first.approval_date, Some(now));
        bookings[0] = first;

        let mut second = bookings[1].clone();
        let err = approve(&mut second, &admin(), &bookings, now).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(err.conflicts().len(), 1);
        assert_eq!(err.conflicts()[0].id, "b1");
        assert_eq!(second.status, BookingStatus::Pending);
    }

    #[test]
    fn approval_ignores_the_booking_itself_and_non_confirmed_ones() {
        let w = window("2026-03-10", "09:00", "11:00");
        let bookings = vec![
            // stale confirmed copy of the booking being approved
            resource_booking("b1", "room", w, BookingStatus::Confirmed),
            resource_booking("b2", "room", w, BookingStatus::Cancelled),
            resource_booking("b3", "room", w, BookingStatus::Rejected),
        ];
        let mut b = resource_booking("b1", "room", w, BookingStatus::Pending);
        approve(&mut b, &admin(), &bookings, at("2026-03-01T12:00:00")).unwrap();
    }

    #[test]
    fn members_cannot_approve() {
        let mut b = resource_booking(
            "b1",
            "room",
            window("2026-03-10", "09:00", "11:00"),
            BookingStatus::Pending,
        );
        let err = approve(&mut b, &member(), &[], at("2026-03-01T12:00:00")).unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[test]
    fn rejecting_twice_is_an_invalid_transition() {
        let mut b = resource_booking(
            "b1",
            "room",
            window("2026-03-10", "09:00", "11:00"),
            BookingStatus::Pending,
        );
        let now = at("2026-03-01T12:00:00");
        reject(&mut b, &admin(), "  Room under maintenance ", now).unwrap();
        assert_eq!(b.status, BookingStatus::Rejected);
        assert_eq!(b.rejection_reason.as_deref(), Some("Room under maintenance"));

        let err = reject(&mut b, &admin(), "again", now).unwrap_err();
        assert!(matches!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Rejected,
                action: Transition::Reject
            }
        ));
    }

    #[test]
    fn rejection_needs_a_reason() {
        let mut b = resource_booking(
            "b1",
            "room",
            window("2026-03-10", "09:00", "11:00"),
            BookingStatus::Pending,
        );
        let err = reject(&mut b, &admin(), "   ", at("2026-03-01T12:00:00")).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(b.status, BookingStatus::Pending);
    }

    #[test]
    fn terminal_states_refuse_everything() {
        let now = at("2026-03-01T12:00:00");
        for status in [BookingStatus::Rejected, BookingStatus::Cancelled] {
            let mut b = resource_booking(
                "b1",
                "room",
                window("2026-03-10", "09:00", "11:00"),
                status,
            );
            assert!(status.is_terminal());
            assert!(approve(&mut b, &admin(), &[], now).is_err());
            assert!(reject(&mut b, &admin(), "no", now).is_err());
            assert!(cancel(&mut b, &admin(), now, cutoff()).is_err());
            assert_eq!(b.status, status);
        }
    }

    #[test]
    fn registration_count_floors_at_zero() {
        assert_eq!(registered_count_after_cancel(3), 2);
        assert_eq!(registered_count_after_cancel(0), 0);
    }
}
