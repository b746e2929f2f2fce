//! Orchestration over the collaborator traits.
//!
//! Every check here runs against a snapshot fetched just before the write, so
//! it is an optimistic pre-check: two requests racing for the same slot can
//! both pass it. When the backend enforces its own no-overlap rule, its
//! refusal comes back as `BookingError::Conflict`; otherwise
//! `audit_double_bookings` reports what slipped through.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cart::{item_window, Cart, CartStore};
use crate::config::EngineConfig;
use crate::conflict::{
    audit_double_bookings, event_resource_conflicts, find_conflicts, first_conflict, Commitment,
    CommitmentRef, DoubleBooking, OverlapRule, ResourceConflict, Scope,
};
use crate::error::BookingError;
use crate::lifecycle::{self, Clock};
use crate::model::{
    Actor, Booking, BookingPatch, BookingStatus, BookingType, CartItem, Event, EventPatch,
    Resource,
};
use crate::recurrence;
use crate::resolve;
use crate::store::{BookingFilter, BookingStore, CatalogStore, Identity, Notifier, StoreError};
use crate::validator::{validate_booking, validate_event};
use crate::window::TimeWindow;

/// A direct reservation of one resource on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub resource_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct BookingService<'a> {
    bookings: &'a dyn BookingStore,
    catalog: &'a dyn CatalogStore,
    notifier: &'a dyn Notifier,
    identity: &'a dyn Identity,
    clock: &'a dyn Clock,
    config: EngineConfig,
}

impl<'a> BookingService<'a> {
    pub fn new(
        bookings: &'a dyn BookingStore,
        catalog: &'a dyn CatalogStore,
        notifier: &'a dyn Notifier,
        identity: &'a dyn Identity,
        clock: &'a dyn Clock,
    ) -> Self {
        BookingService {
            bookings,
            catalog,
            notifier,
            identity,
            clock,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Bookings waiting for an admin decision.
    pub fn pending_approvals(&self) -> Result<Vec<Booking>, BookingError> {
        Ok(self
            .bookings
            .list_bookings(&BookingFilter::awaiting_approval())?)
    }

    /// Confirmed resource bookings that overlap each other.
    pub fn audit(&self) -> Result<Vec<DoubleBooking>, BookingError> {
        let confirmed = self.bookings.list_bookings(&BookingFilter::confirmed())?;
        let found = audit_double_bookings(&confirmed);
        if !found.is_empty() {
            warn!(clusters = found.len(), "double-booked resources found");
        }
        Ok(found)
    }

    /// The signed-in user. Every write acts on their behalf.
    fn current_actor(&self, what: &str) -> Result<Actor, BookingError> {
        self.identity
            .current_user()
            .ok_or_else(|| BookingError::Forbidden(format!("{} without signing in", what)))
    }

    fn find_booking(&self, id: &str) -> Result<Booking, BookingError> {
        self.bookings
            .list_bookings(&BookingFilter::default())?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| BookingError::NotFound {
                kind: "Booking",
                id: id.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Resource bookings
    // -----------------------------------------------------------------------

    /// Book a resource directly (booking dialog). The slot is checked against
    /// confirmed bookings of the resource and events that have it assigned,
    /// using the same-day rule; the first conflict is reported.
    #[tracing::instrument(skip(self, request), fields(resource = %request.resource_id))]
    pub fn request_resource_booking(
        &self,
        request: &ResourceRequest,
    ) -> Result<Booking, BookingError> {
        let actor = self.current_actor("book resources")?;
        let resource = self
            .catalog
            .list_resources()?
            .into_iter()
            .find(|r| r.id == request.resource_id)
            .ok_or_else(|| BookingError::NotFound {
                kind: "Resource",
                id: request.resource_id.clone(),
            })?;
        let window = TimeWindow::on_day(request.date, &request.start_time, &request.end_time)?;
        let scope = Scope::Resource(resource.id.clone());

        let confirmed = self.bookings.list_bookings(&BookingFilter {
            status: Some(BookingStatus::Confirmed),
            resource_id: Some(resource.id.clone()),
            ..Default::default()
        })?;
        if let Some(hit) = first_conflict(&window, &scope, &confirmed, None, OverlapRule::SameDay) {
            return Err(BookingError::conflict(vec![hit.to_ref()]));
        }
        let events = self.catalog.list_events()?;
        if let Some(hit) = first_conflict(&window, &scope, &events, None, OverlapRule::SameDay) {
            return Err(BookingError::conflict(vec![hit.to_ref()]));
        }

        let mut booking = Booking::for_resource(resource.id.clone(), &window);
        booking.status = lifecycle::initial_status(resource.requires_approval);
        booking.approval_required = resource.requires_approval;
        booking.created_by = Some(actor.email.clone());
        booking.purpose = request.purpose.clone();
        booking.notes = request.notes.clone();
        booking.total_price = resource.daily_price;
        booking.resource_name = Some(resource.name.clone());
        validate_booking(&booking).into_result()?;

        let created = self.bookings.create_booking(booking)?;
        info!(booking_id = %created.id, status = %created.status, "resource booking created");
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub fn approve(&self, booking_id: &str) -> Result<Booking, BookingError> {
        let approver = self.current_actor("approve bookings")?;
        let all = self.bookings.list_bookings(&BookingFilter::default())?;
        let mut booking = all
            .iter()
            .find(|b| b.id == booking_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound {
                kind: "Booking",
                id: booking_id.to_string(),
            })?;

        lifecycle::approve(&mut booking, &approver, &all, self.clock.now())?;
        let saved = self
            .bookings
            .update_booking(&booking.id, &BookingPatch::lifecycle_of(&booking))?;
        info!(booking_id = %saved.id, "booking approved");

        self.notify(
            saved.created_by.as_deref(),
            "Your booking has been approved",
            &format!(
                "Your booking for {} ({}) is confirmed.",
                self.display_name(&saved),
                saved.window()
            ),
        );
        Ok(saved)
    }

    #[tracing::instrument(skip(self, reason))]
    pub fn reject(&self, booking_id: &str, reason: &str) -> Result<Booking, BookingError> {
        let approver = self.current_actor("reject bookings")?;
        let mut booking = self.find_booking(booking_id)?;
        lifecycle::reject(&mut booking, &approver, reason, self.clock.now())?;
        let saved = self
            .bookings
            .update_booking(&booking.id, &BookingPatch::lifecycle_of(&booking))?;
        info!(booking_id = %saved.id, "booking rejected");

        self.notify(
            saved.created_by.as_deref(),
            "Your booking was not approved",
            &format!(
                "Your booking for {} ({}) was rejected: {}",
                self.display_name(&saved),
                saved.window(),
                saved.rejection_reason.as_deref().unwrap_or_default()
            ),
        );
        Ok(saved)
    }

    /// Cancel a confirmed booking. For event registrations the event's
    /// registered count is decremented afterwards; if that fails the
    /// cancellation still stands.
    #[tracing::instrument(skip(self))]
    pub fn cancel(&self, booking_id: &str) -> Result<Booking, BookingError> {
        let actor = self.current_actor("cancel bookings")?;
        let mut booking = self.find_booking(booking_id)?;
        lifecycle::cancel(&mut booking, &actor, self.clock.now(), self.config.cutoff()?)?;
        let saved = self
            .bookings
            .update_booking(&booking.id, &BookingPatch::lifecycle_of(&booking))?;
        info!(booking_id = %saved.id, "booking cancelled");

        if saved.booking_type == BookingType::Event {
            if let Some(event_id) = saved.event_id.as_deref() {
                self.sync_registered_count(event_id, lifecycle::registered_count_after_cancel);
            }
        }
        Ok(saved)
    }

    /// Best-effort registration count update. Failures are logged only.
    fn sync_registered_count(&self, event_id: &str, update: impl Fn(u32) -> u32) {
        let result = self.catalog.list_events().and_then(|events| {
            match events.into_iter().find(|e| e.id == event_id) {
                Some(event) => self.catalog.update_event(
                    event_id,
                    &EventPatch::RegisteredCount(update(event.registered_count)),
                ),
                None => Err(StoreError::NotFound {
                    kind: "Event",
                    id: event_id.to_string(),
                }),
            }
        });
        match result {
            Ok(event) => {
                debug!(event_id, count = event.registered_count, "registration count synced")
            }
            Err(e) => warn!(event_id, error = %e, "failed to sync registration count"),
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    fn require_admin(&self, what: &str) -> Result<(), BookingError> {
        if self.current_actor(what)?.is_admin() {
            Ok(())
        } else {
            Err(BookingError::Forbidden(what.to_string()))
        }
    }

    /// Create an event, or a whole series when the draft is recurring.
    ///
    /// The draft is validated and its assigned resources checked against other
    /// events on the same day. Later occurrences of a series are only checked
    /// when `check_series_conflicts` is on.
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create_event(&self, draft: Event) -> Result<Vec<Event>, BookingError> {
        self.require_admin("create events")?;
        let resources = self.catalog.list_resources()?;
        validate_event(&draft, &resources).into_result()?;

        let existing = self.catalog.list_events()?;
        ensure_no_resource_conflicts(event_resource_conflicts(&draft, &existing, &resources))?;

        let to_create = match (draft.is_recurring, draft.recurrence_end_date) {
            (true, Some(until)) => {
                let pattern = draft.recurrence_pattern.unwrap_or_default();
                let series = recurrence::expand(&draft, pattern, until);
                if series.is_empty() {
                    return Err(BookingError::validation(
                        "Recurrence end date is before the first occurrence",
                    ));
                }
                if self.config.check_series_conflicts {
                    for occurrence in series.iter().skip(1) {
                        ensure_no_resource_conflicts(event_resource_conflicts(
                            occurrence, &existing, &resources,
                        ))?;
                    }
                }
                series
            }
            _ => vec![Event {
                id: String::new(),
                ..draft
            }],
        };

        let mut created = Vec::with_capacity(to_create.len());
        for event in to_create {
            created.push(self.catalog.create_event(event)?);
        }
        info!(count = created.len(), "events created");
        Ok(created)
    }

    /// Save edits to an existing event. Its stored version never conflicts
    /// with the edit.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn update_event(&self, event: Event) -> Result<Event, BookingError> {
        self.require_admin("edit events")?;
        if event.id.is_empty() {
            return Err(BookingError::validation("Event id is required for an update"));
        }
        let resources = self.catalog.list_resources()?;
        validate_event(&event, &resources).into_result()?;

        let existing = self.catalog.list_events()?;
        ensure_no_resource_conflicts(event_resource_conflicts(&event, &existing, &resources))?;

        let id = event.id.clone();
        let saved = self
            .catalog
            .update_event(&id, &EventPatch::Details(Box::new(event)))?;
        info!(event_id = %saved.id, "event updated");
        Ok(saved)
    }

    // -----------------------------------------------------------------------
    // Checkout
    // -----------------------------------------------------------------------

    /// Turn every staged item into a booking.
    ///
    /// Resource items are re-checked against current confirmed bookings and
    /// against the items ahead of them in this checkout; any conflict aborts
    /// before anything is written. The cart is cleared only when every
    /// booking was created.
    #[tracing::instrument(skip_all)]
    pub fn checkout<S: CartStore>(&self, cart: &mut Cart<S>) -> Result<Vec<Booking>, BookingError> {
        let actor = self.current_actor("check out")?;
        if cart.is_empty() {
            return Err(BookingError::validation("Your cart is empty"));
        }

        let confirmed = self.bookings.list_bookings(&BookingFilter::confirmed())?;
        let resources = self.catalog.list_resources()?;
        let events = self.catalog.list_events()?;

        let mut planned: Vec<Booking> = Vec::with_capacity(cart.items().len());
        for item in cart.items() {
            let booking = match item.kind {
                BookingType::Resource => {
                    self.plan_resource_item(item, &actor, &resources, &confirmed, &planned)?
                }
                BookingType::Event => self.plan_event_item(item, &actor, &events, &confirmed)?,
            };
            validate_booking(&booking).into_result()?;
            planned.push(booking);
        }

        let mut created = Vec::with_capacity(planned.len());
        for booking in planned {
            match self.bookings.create_booking(booking) {
                Ok(b) => created.push(b),
                Err(e) => {
                    if !created.is_empty() {
                        warn!(created = created.len(), "checkout failed part way; cart kept");
                    }
                    return Err(e.into());
                }
            }
        }

        for b in created.iter().filter(|b| b.booking_type == BookingType::Event) {
            if let Some(event_id) = b.event_id.as_deref() {
                self.sync_registered_count(event_id, |n| n.saturating_add(1));
            }
        }

        if let Err(e) = cart.clear() {
            warn!(error = %e, "bookings created but the cart could not be cleared");
        }
        info!(count = created.len(), "checkout complete");

        let summary: Vec<String> = created
            .iter()
            .map(|b| format!("{} ({}, {})", self.display_name(b), b.window(), b.status))
            .collect();
        self.notify(
            Some(actor.email.as_str()),
            "Booking confirmation",
            &format!("Your bookings:\n{}", summary.join("\n")),
        );
        Ok(created)
    }

    fn plan_resource_item(
        &self,
        item: &CartItem,
        actor: &Actor,
        resources: &[Resource],
        confirmed: &[Booking],
        planned: &[Booking],
    ) -> Result<Booking, BookingError> {
        let resource = resources
            .iter()
            .find(|r| r.id == item.item_id)
            .ok_or_else(|| BookingError::NotFound {
                kind: "Resource",
                id: item.item_id.clone(),
            })?;
        let window = item_window(
            item,
            self.clock.now().date(),
            self.config.default_start_time,
            self.config.default_end_time,
        )?;

        let conflicts = find_conflicts(
            &window,
            &Scope::Resource(resource.id.clone()),
            confirmed.iter().chain(planned),
            None,
            OverlapRule::Timestamp,
        );
        if !conflicts.is_empty() {
            return Err(BookingError::conflict(
                conflicts.into_iter().map(Commitment::to_ref).collect(),
            ));
        }

        let mut booking = Booking::for_resource(resource.id.clone(), &window);
        booking.status = lifecycle::initial_status(resource.requires_approval);
        booking.approval_required = resource.requires_approval;
        booking.created_by = Some(actor.email.clone());
        booking.purpose = item.purpose.clone();
        booking.notes = item.notes.clone();
        booking.total_price = item.total_price;
        booking.resource_name = Some(resource.name.clone());
        Ok(booking)
    }

    fn plan_event_item(
        &self,
        item: &CartItem,
        actor: &Actor,
        events: &[Event],
        confirmed: &[Booking],
    ) -> Result<Booking, BookingError> {
        let event = events
            .iter()
            .find(|e| e.id == item.item_id)
            .ok_or_else(|| BookingError::NotFound {
                kind: "Event",
                id: item.item_id.clone(),
            })?;

        let held: Vec<CommitmentRef> = confirmed
            .iter()
            .filter(|b| actor.owns(b) && b.event_id.as_deref() == Some(event.id.as_str()))
            .map(Commitment::to_ref)
            .collect();
        if !held.is_empty() {
            return Err(BookingError::conflict(held));
        }

        let mut booking = Booking::for_event(event.id.clone(), &event.window());
        booking.status = lifecycle::initial_status(false);
        booking.created_by = Some(actor.email.clone());
        booking.purpose = item.purpose.clone();
        booking.notes = item.notes.clone();
        booking.total_price = item.total_price;
        booking.event_title = Some(event.title.clone());
        Ok(booking)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn display_name(&self, booking: &Booking) -> String {
        if booking.event_title.is_some() || booking.resource_name.is_some() {
            return resolve::display_name(booking, None, None).to_string();
        }
        let events = self.catalog.list_events().unwrap_or_default();
        let resources = self.catalog.list_resources().unwrap_or_default();
        let (event, resource) = resolve::lookup(booking, &events, &resources);
        resolve::display_name(booking, event, resource).to_string()
    }

    /// Fire-and-forget email. Recipients that are not addresses are skipped.
    fn notify(&self, to: Option<&str>, subject: &str, body: &str) {
        let Some(to) = to.filter(|t| t.contains('@')) else {
            debug!(subject, "no email address for notification, skipping");
            return;
        };
        if let Err(e) = self.notifier.send_email(to, subject, body) {
            warn!(to, subject, error = %e, "notification failed");
        }
    }
}

fn ensure_no_resource_conflicts(conflicts: Vec<ResourceConflict>) -> Result<(), BookingError> {
    if conflicts.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = conflicts.iter().map(|c| c.resource_name.as_str()).collect();
    debug!(resources = %names.join(", "), "event resource conflicts");
    Err(BookingError::conflict(
        conflicts.into_iter().flat_map(|c| c.events).collect(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::LocalCartStore;
    use crate::fixtures::{
        admin, at, day, event, event_booking, member, resource, resource_booking, window,
    };
    use crate::lifecycle::FixedClock;
    use crate::model::RecurrencePattern;
    use crate::store::memory::{InMemoryStore, RecordingNotifier, StaticIdentity};

    fn clock() -> FixedClock {
        FixedClock(at("2026-03-01T12:00:00"))
    }

    fn signed_in(actor: Actor) -> StaticIdentity {
        StaticIdentity(Some(actor))
    }

    fn request(start: &str, end: &str) -> ResourceRequest {
        ResourceRequest {
            resource_id: "room".to_string(),
            date: day("2026-03-10"),
            start_time: start.to_string(),
            end_time: end.to_string(),
            purpose: Some("Team sync".to_string()),
            notes: None,
        }
    }

    #[test]
    fn direct_booking_checks_bookings_and_event_assignments() {
        let store = InMemoryStore::new()
            .with_resources(vec![resource("room", "Room 1")])
            .with_events(vec![event("ev-1", "2026-03-10", "14:00", "16:00", &["room"])])
            .with_bookings(vec![resource_booking(
                "a",
                "room",
                window("2026-03-10", "09:00", "11:00"),
                BookingStatus::Confirmed,
            )]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let err = svc.request_resource_booking(&request("10:00", "12:00")).unwrap_err();
        assert_eq!(err.conflicts()[0].id, "a");
        let err = svc.request_resource_booking(&request("15:00", "17:00")).unwrap_err();
        assert_eq!(err.conflicts()[0].id, "ev-1");

        let created = svc.request_resource_booking(&request("11:00", "14:00")).unwrap();
        assert_eq!(created.status, BookingStatus::Confirmed);
        assert_eq!(created.created_by.as_deref(), Some("member@example.com"));
        assert!(!created.id.is_empty());
    }

    #[test]
    fn approval_flow_notifies_and_survives_mail_failure() {
        let mut pending = resource_booking(
            "b1",
            "room",
            window("2026-03-10", "09:00", "10:00"),
            BookingStatus::Pending,
        );
        pending.approval_required = true;
        let store = InMemoryStore::new()
            .with_resources(vec![resource("room", "Room 1")])
            .with_bookings(vec![pending]);
        let notifier = RecordingNotifier::failing();
        let user = signed_in(admin());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        assert_eq!(svc.pending_approvals().unwrap().len(), 1);
        let saved = svc.approve("b1").unwrap();
        assert_eq!(saved.status, BookingStatus::Confirmed);
        assert_eq!(saved.approval_date, Some(clock.0));
        assert!(svc.pending_approvals().unwrap().is_empty());

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "member@example.com");
        assert!(sent[0].body.contains("Room 1"));

        let err = svc.reject("b1", "too late").unwrap_err();
        assert_eq!(err.kind(), "invalidTransition");
        assert_eq!(svc.approve("missing").unwrap_err().kind(), "notFound");
    }

    #[test]
    fn cancelling_a_registration_decrements_the_event() {
        let mut ev = event("ev-1", "2026-03-10", "18:00", "20:00", &[]);
        ev.registered_count = 4;
        let store = InMemoryStore::new().with_events(vec![ev]).with_bookings(vec![event_booking(
            "b1",
            "ev-1",
            window("2026-03-10", "18:00", "20:00"),
            BookingStatus::Confirmed,
        )]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let saved = svc.cancel("b1").unwrap();
        assert_eq!(saved.status, BookingStatus::Cancelled);
        assert_eq!(store.events()[0].registered_count, 3);
    }

    #[test]
    fn count_sync_failure_does_not_undo_the_cancellation() {
        let store = InMemoryStore::new()
            .with_events(vec![event("ev-1", "2026-03-10", "18:00", "20:00", &[])])
            .with_bookings(vec![event_booking(
                "b1",
                "ev-1",
                window("2026-03-10", "18:00", "20:00"),
                BookingStatus::Confirmed,
            )]);
        store.fail_event_updates(true);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        svc.cancel("b1").unwrap();
        assert_eq!(store.bookings()[0].status, BookingStatus::Cancelled);
    }

    #[test]
    fn cutoff_comes_from_config() {
        let store = InMemoryStore::new().with_bookings(vec![resource_booking(
            "b1",
            "room",
            window("2026-03-02", "09:00", "10:00"),
            BookingStatus::Confirmed,
        )]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);
        assert_eq!(svc.cancel("b1").unwrap_err().kind(), "cancellationWindowClosed");

        let relaxed =
            BookingService::new(&store, &store, &notifier, &user, &clock).with_config(EngineConfig {
                cancellation_cutoff_hours: 12,
                ..Default::default()
            });
        relaxed.cancel("b1").unwrap();
    }

    #[test]
    fn recurring_event_creates_a_series() {
        let store = InMemoryStore::new().with_resources(vec![resource("hall", "Main Hall")]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(admin());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let mut draft = event("", "2026-01-05", "18:00", "19:00", &["hall"]);
        draft.is_recurring = true;
        draft.recurrence_pattern = Some(RecurrencePattern::Weekly);
        draft.recurrence_end_date = Some(day("2026-01-26"));

        let created = svc.create_event(draft.clone()).unwrap();
        assert_eq!(created.len(), 4);
        assert!(created.iter().all(|e| !e.id.is_empty()));
        assert_eq!(created[0].series_id, created[3].series_id);

        // Same slot again conflicts on the first occurrence
        let err = svc.create_event(draft).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(err.conflicts().len(), 1);

        let visitor = signed_in(member());
        let as_member = BookingService::new(&store, &store, &notifier, &visitor, &clock);
        let err = as_member
            .create_event(event("", "2026-02-01", "09:00", "10:00", &[]))
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn later_occurrences_are_checked_only_when_enabled() {
        let store = InMemoryStore::new()
            .with_resources(vec![resource("hall", "Main Hall")])
            .with_events(vec![event("ev-9", "2026-01-12", "18:30", "20:00", &["hall"])]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(admin());
        let clock = clock();

        let mut draft = event("", "2026-01-05", "18:00", "19:00", &["hall"]);
        draft.is_recurring = true;
        draft.recurrence_end_date = Some(day("2026-01-19"));

        let strict =
            BookingService::new(&store, &store, &notifier, &user, &clock).with_config(EngineConfig {
                check_series_conflicts: true,
                ..Default::default()
            });
        assert_eq!(strict.create_event(draft.clone()).unwrap_err().kind(), "conflict");

        let lenient = BookingService::new(&store, &store, &notifier, &user, &clock);
        assert_eq!(lenient.create_event(draft).unwrap().len(), 3);
    }

    #[test]
    fn editing_an_event_does_not_conflict_with_itself() {
        let stored = event("ev-1", "2026-03-10", "09:00", "11:00", &["hall"]);
        let store = InMemoryStore::new()
            .with_resources(vec![resource("hall", "Main Hall")])
            .with_events(vec![stored.clone()]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(admin());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let mut edited = stored;
        edited.title = "Renamed".to_string();
        let saved = svc.update_event(edited).unwrap();
        assert_eq!(saved.title, "Renamed");
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn checkout_creates_bookings_and_clears_the_cart() {
        let mut gated = resource("lab", "Lab");
        gated.requires_approval = true;
        let mut ev = event("ev-1", "2026-03-12", "18:00", "20:00", &[]);
        ev.registered_count = 1;
        let store = InMemoryStore::new()
            .with_resources(vec![resource("room", "Room 1"), gated.clone()])
            .with_events(vec![ev.clone()]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let mut cart = Cart::new(LocalCartStore::new()).unwrap();
        let room = resource("room", "Room 1");
        cart.add(CartItem::for_resource(&room, day("2026-03-10"), "09:00", "10:00"), &[])
            .unwrap();
        cart.add(CartItem::for_resource(&gated, day("2026-03-10"), "09:00", "10:00"), &[])
            .unwrap();
        cart.add(CartItem::for_event(&ev), &[]).unwrap();

        let created = svc.checkout(&mut cart).unwrap();
        let statuses: Vec<BookingStatus> = created.iter().map(|b| b.status).collect();
        assert_eq!(
            statuses,
            vec![BookingStatus::Confirmed, BookingStatus::Pending, BookingStatus::Confirmed]
        );
        assert!(created[1].approval_required);
        assert!(cart.is_empty());
        assert_eq!(store.events()[0].registered_count, 2);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn checkout_aborts_on_conflict_and_keeps_the_cart() {
        let store = InMemoryStore::new().with_resources(vec![resource("room", "Room 1")]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let mut cart = Cart::new(LocalCartStore::new()).unwrap();
        let room = resource("room", "Room 1");
        cart.add(CartItem::for_resource(&room, day("2026-03-10"), "09:00", "11:00"), &[]).unwrap();
        // Staging does not compare cart items; checkout does
        cart.add(CartItem::for_resource(&room, day("2026-03-10"), "10:00", "12:00"), &[]).unwrap();

        let err = svc.checkout(&mut cart).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(cart.items().len(), 2);
        assert!(store.bookings().is_empty());

        let mut empty = Cart::new(LocalCartStore::new()).unwrap();
        assert_eq!(svc.checkout(&mut empty).unwrap_err().kind(), "validation");
    }

    #[test]
    fn checkout_item_without_a_day_is_booked_for_today() {
        let store = InMemoryStore::new().with_resources(vec![resource("room", "Room 1")]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);

        let room = resource("room", "Room 1");
        let mut item = CartItem::for_resource(&room, day("2026-03-10"), "14:00", "15:00");
        item.start_date = None;
        // Staging always sets a day, so the item comes from stored cart data
        let raw = serde_json::to_string(&vec![item]).unwrap();
        let mut cart = Cart::new(LocalCartStore::with_raw(&raw)).unwrap();

        let created = svc.checkout(&mut cart).unwrap();
        assert_eq!(created[0].window(), window("2026-03-01", "14:00", "15:00"));
    }

    #[test]
    fn signed_out_users_cannot_write() {
        let store = InMemoryStore::new()
            .with_resources(vec![resource("room", "Room 1")])
            .with_bookings(vec![Booking {
                approval_required: true,
                ..resource_booking(
                    "b1",
                    "room",
                    window("2026-03-10", "09:00", "10:00"),
                    BookingStatus::Pending,
                )
            }]);
        let notifier = RecordingNotifier::new();
        let nobody = StaticIdentity::default();
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &nobody, &clock);

        let err = svc.request_resource_booking(&request("11:00", "12:00")).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert!(err.to_string().contains("without signing in"));
        assert_eq!(svc.approve("b1").unwrap_err().kind(), "forbidden");
        assert_eq!(svc.cancel("b1").unwrap_err().kind(), "forbidden");
        assert_eq!(
            svc.create_event(event("", "2026-03-12", "09:00", "10:00", &[]))
                .unwrap_err()
                .kind(),
            "forbidden"
        );

        let mut cart = Cart::new(LocalCartStore::new()).unwrap();
        assert_eq!(svc.checkout(&mut cart).unwrap_err().kind(), "forbidden");

        // Reads do not need a user
        assert_eq!(svc.pending_approvals().unwrap().len(), 1);
        assert!(store.bookings().iter().all(|b| b.status == BookingStatus::Pending));
        assert!(notifier.sent().is_empty());
    }

    struct RefusingStore;

    impl BookingStore for RefusingStore {
        fn list_bookings(&self, _: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
            Ok(Vec::new())
        }

        fn create_booking(&self, _: Booking) -> Result<Booking, StoreError> {
            Err(StoreError::Conflict("exclusion constraint violated".to_string()))
        }

        fn update_booking(&self, id: &str, _: &BookingPatch) -> Result<Booking, StoreError> {
            Err(StoreError::NotFound {
                kind: "Booking",
                id: id.to_string(),
            })
        }
    }

    #[test]
    fn backend_conflict_surfaces_as_conflict() {
        let catalog = InMemoryStore::new().with_resources(vec![resource("room", "Room 1")]);
        let notifier = RecordingNotifier::new();
        let user = signed_in(member());
        let clock = clock();
        let svc = BookingService::new(&RefusingStore, &catalog, &notifier, &user, &clock);

        let err = svc.request_resource_booking(&request("09:00", "10:00")).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(err.conflicts().is_empty());
        assert!(err.to_string().contains("exclusion constraint"));
    }

    #[test]
    fn audit_reports_double_bookings() {
        let w = window("2026-03-10", "09:00", "10:00");
        let store = InMemoryStore::new().with_bookings(vec![
            resource_booking("a", "room", w, BookingStatus::Confirmed),
            resource_booking("b", "room", w, BookingStatus::Confirmed),
        ]);
        let notifier = RecordingNotifier::new();
        let user = StaticIdentity::default();
        let clock = clock();
        let svc = BookingService::new(&store, &store, &notifier, &user, &clock);
        let found = svc.audit().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bookings.len(), 2);
    }
}
