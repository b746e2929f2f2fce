//! Collaborator boundary: the backend, mail delivery and identity.
//!
//! The core never talks to these directly; the service layer drives them
//! through the traits below so everything can be faked in tests.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{Actor, Booking, BookingPatch, BookingStatus, Event, EventPatch, Resource};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend refused the write because it overlaps something it knows
    /// about (its own exclusion constraint, HTTP 409, ...).
    #[error("{0}")]
    Conflict(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed backend response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("email delivery failed: {0}")]
pub struct NotifyError(pub String);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Optional constraints for `BookingStore::list_bookings`. Unset fields match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub resource_id: Option<String>,
    pub event_id: Option<String>,
    pub approval_required: Option<bool>,
    pub created_by: Option<String>,
}

impl BookingFilter {
    pub fn confirmed() -> Self {
        BookingFilter {
            status: Some(BookingStatus::Confirmed),
            ..Default::default()
        }
    }

    pub fn awaiting_approval() -> Self {
        BookingFilter {
            status: Some(BookingStatus::Pending),
            approval_required: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, b: &Booking) -> bool {
        self.status.is_none_or(|s| b.status == s)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|id| b.resource_id.as_ref() == Some(id))
            && self
                .event_id
                .as_ref()
                .is_none_or(|id| b.event_id.as_ref() == Some(id))
            && self
                .approval_required
                .is_none_or(|req| b.approval_required == req)
            && self
                .created_by
                .as_ref()
                .is_none_or(|who| b.created_by.as_ref() == Some(who))
    }
}

pub trait BookingStore {
    fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError>;
    /// Persist a new booking; the store assigns its id.
    fn create_booking(&self, booking: Booking) -> Result<Booking, StoreError>;
    fn update_booking(&self, id: &str, patch: &BookingPatch) -> Result<Booking, StoreError>;
}

pub trait CatalogStore {
    fn list_events(&self) -> Result<Vec<Event>, StoreError>;
    fn list_resources(&self) -> Result<Vec<Resource>, StoreError>;
    /// Persist a new event; the store assigns its id.
    fn create_event(&self, event: Event) -> Result<Event, StoreError>;
    fn update_event(&self, id: &str, patch: &EventPatch) -> Result<Event, StoreError>;
}

/// Fire-and-forget email. Failures are reported but never block a caller.
pub trait Notifier {
    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

pub trait Identity {
    fn current_user(&self) -> Option<Actor>;
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// List endpoints answer either with a bare array or with `{ "data": [...] }`.
/// An object without `data` counts as an empty list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(default = "Vec::new")]
        data: Vec<T>,
    },
}

impl<T> ListResponse<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) | ListResponse::Wrapped { data: items } => items,
        }
    }
}

/// Decode a list response body of either shape into a plain vector.
pub fn normalize_list<T: DeserializeOwned>(body: serde_json::Value) -> Result<Vec<T>, StoreError> {
    let response: ListResponse<T> = serde_json::from_value(body)?;
    Ok(response.into_vec())
}

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

/// In-process implementations of the collaborator traits, for embedding the
/// engine without a backend and for tests.
pub mod memory {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct InMemoryStore {
        bookings: Mutex<Vec<Booking>>,
        events: Mutex<Vec<Event>>,
        resources: Mutex<Vec<Resource>>,
        next_id: AtomicU64,
        fail_event_updates: AtomicBool,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            InMemoryStore::default()
        }

        pub fn with_resources(self, resources: Vec<Resource>) -> Self {
            *self.resources.lock() = resources;
            self
        }

        pub fn with_events(self, events: Vec<Event>) -> Self {
            *self.events.lock() = events;
            self
        }

        pub fn with_bookings(self, bookings: Vec<Booking>) -> Self {
            *self.bookings.lock() = bookings;
            self
        }

        /// Make every `update_event` call fail, to exercise best-effort paths.
        pub fn fail_event_updates(&self, fail: bool) {
            self.fail_event_updates.store(fail, Ordering::SeqCst);
        }

        pub fn bookings(&self) -> Vec<Booking> {
            self.bookings.lock().clone()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        fn fresh_id(&self, prefix: &str) -> String {
            format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    impl BookingStore for InMemoryStore {
        fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
            Ok(self
                .bookings
                .lock()
                .iter()
                .filter(|b| filter.matches(b))
                .cloned()
                .collect())
        }

        fn create_booking(&self, mut booking: Booking) -> Result<Booking, StoreError> {
            booking.id = self.fresh_id("bk");
            self.bookings.lock().push(booking.clone());
            Ok(booking)
        }

        fn update_booking(&self, id: &str, patch: &BookingPatch) -> Result<Booking, StoreError> {
            let mut bookings = self.bookings.lock();
            let booking = bookings
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "Booking",
                    id: id.to_string(),
                })?;
            patch.apply_to(booking);
            Ok(booking.clone())
        }
    }

    impl CatalogStore for InMemoryStore {
        fn list_events(&self) -> Result<Vec<Event>, StoreError> {
            Ok(self.events.lock().clone())
        }

        fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
            Ok(self.resources.lock().clone())
        }

        fn create_event(&self, mut event: Event) -> Result<Event, StoreError> {
            event.id = self.fresh_id("ev");
            self.events.lock().push(event.clone());
            Ok(event)
        }

        fn update_event(&self, id: &str, patch: &EventPatch) -> Result<Event, StoreError> {
            if self.fail_event_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("event updates disabled".to_string()));
            }
            let mut events = self.events.lock();
            let event = events
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "Event",
                    id: id.to_string(),
                })?;
            match patch {
                EventPatch::RegisteredCount(count) => event.registered_count = *count,
                EventPatch::Details(details) => {
                    *event = Event {
                        id: id.to_string(),
                        ..(**details).clone()
                    };
                }
            }
            Ok(event.clone())
        }
    }

    /// A sent (or attempted) email.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentEmail {
        pub to: String,
        pub subject: String,
        pub body: String,
    }

    /// Records every email; optionally fails each delivery after recording.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<SentEmail>>,
        failing: AtomicBool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            RecordingNotifier::default()
        }

        pub fn failing() -> Self {
            let n = RecordingNotifier::default();
            n.failing.store(true, Ordering::SeqCst);
            n
        }

        pub fn sent(&self) -> Vec<SentEmail> {
            self.sent.lock().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent.lock().push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError("smtp relay refused connection".to_string()));
            }
            Ok(())
        }
    }

    /// Identity provider that always answers with the same user.
    #[derive(Debug, Clone, Default)]
    pub struct StaticIdentity(pub Option<Actor>);

    impl Identity for StaticIdentity {
        fn current_user(&self) -> Option<Actor> {
            self.0.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
