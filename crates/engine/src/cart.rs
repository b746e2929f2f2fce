//! Client-local staging of prospective bookings.
//!
//! Items are checked against the confirmed bookings of the moment, but nothing
//! is persisted to the backend until checkout.

use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use tracing::debug;

use crate::conflict::{find_conflicts, Commitment, OverlapRule, Scope};
use crate::error::BookingError;
use crate::model::{Booking, BookingType, CartItem};
use crate::window::{self, TimeWindow};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CartStoreError {
    #[error("cart storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored cart is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Where the cart lives between page loads.
pub trait CartStore {
    fn load(&self) -> Result<Vec<CartItem>, CartStoreError>;
    fn save(&self, items: &[CartItem]) -> Result<(), CartStoreError>;
    fn clear(&self) -> Result<(), CartStoreError>;
}

/// Keeps the cart as one serialized JSON string, the way browser local
/// storage does.
#[derive(Debug, Default)]
pub struct LocalCartStore {
    raw: Mutex<Option<String>>,
}

impl LocalCartStore {
    pub fn new() -> Self {
        LocalCartStore::default()
    }

    /// Start from a previously stored value.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        LocalCartStore {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().clone()
    }
}

impl<T: CartStore + ?Sized> CartStore for &T {
    fn load(&self) -> Result<Vec<CartItem>, CartStoreError> {
        (**self).load()
    }

    fn save(&self, items: &[CartItem]) -> Result<(), CartStoreError> {
        (**self).save(items)
    }

    fn clear(&self) -> Result<(), CartStoreError> {
        (**self).clear()
    }
}

impl CartStore for LocalCartStore {
    fn load(&self) -> Result<Vec<CartItem>, CartStoreError> {
        match self.raw.lock().as_deref() {
            None => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(raw)?),
        }
    }

    fn save(&self, items: &[CartItem]) -> Result<(), CartStoreError> {
        let raw = serde_json::to_string(items)?;
        *self.raw.lock() = Some(raw);
        Ok(())
    }

    fn clear(&self) -> Result<(), CartStoreError> {
        *self.raw.lock() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Staging checks
// ---------------------------------------------------------------------------

/// The window a resource item would occupy: its day combined with its
/// `HH:MM` times. A missing day falls back to `today` and missing times to
/// the given defaults. A day that is present but unparseable is an error.
pub fn item_window(
    item: &CartItem,
    today: NaiveDate,
    default_start: NaiveTime,
    default_end: NaiveTime,
) -> Result<TimeWindow, BookingError> {
    let date = match item.start_date.as_deref() {
        None => today,
        Some(_) => item.date().ok_or_else(|| no_date(item))?,
    };
    let start = item
        .start_time
        .as_deref()
        .map(|s| window::parse_time(s).ok_or_else(|| bad_time(s)))
        .transpose()?
        .unwrap_or(default_start);
    let end = item
        .end_time
        .as_deref()
        .map(|s| window::parse_time(s).ok_or_else(|| bad_time(s)))
        .transpose()?
        .unwrap_or(default_end);

    let w = TimeWindow::new(date.and_time(start), date.and_time(end));
    if !w.is_positive() {
        return Err(BookingError::validation("End time must be after start time"));
    }
    Ok(w)
}

fn no_date(item: &CartItem) -> BookingError {
    BookingError::validation(format!("{} has no valid date", item.name))
}

fn bad_time(s: &str) -> BookingError {
    BookingError::validation(format!("Invalid time '{}', expected HH:MM", s))
}

/// Check whether `item` may be added to `cart`.
///
/// `bookings` is the current snapshot; only confirmed entries block. For
/// event tickets, pass the current user's bookings: holding a confirmed
/// registration for the event is what blocks a second ticket.
///
/// Items already in the cart are not checked against each other.
pub fn stage(item: &CartItem, cart: &[CartItem], bookings: &[Booking]) -> Result<(), BookingError> {
    let duplicate = cart.iter().any(|existing| match item.kind {
        BookingType::Event => {
            existing.kind == BookingType::Event && existing.item_id == item.item_id
        }
        BookingType::Resource => existing.same_slot(item),
    });
    if duplicate {
        return Err(BookingError::Duplicate(item.name.clone()));
    }

    let confirmed = bookings.iter().filter(|b| b.is_confirmed());
    let conflicts: Vec<&Booking> = match item.kind {
        BookingType::Resource => {
            let (Some(start), Some(end)) = (item.start_time.as_deref(), item.end_time.as_deref())
            else {
                return Err(BookingError::validation(format!(
                    "{} needs a start and end time",
                    item.name
                )));
            };
            let date = item.date().ok_or_else(|| no_date(item))?;
            let candidate = TimeWindow::on_day(date, start, end)?;
            find_conflicts(
                &candidate,
                &Scope::Resource(item.item_id.clone()),
                confirmed,
                None,
                OverlapRule::Timestamp,
            )
        }
        BookingType::Event => confirmed
            .filter(|b| b.event_id.as_deref() == Some(item.item_id.as_str()))
            .collect(),
    };

    if !conflicts.is_empty() {
        debug!(item = %item.item_id, conflicts = conflicts.len(), "cart item refused");
        return Err(BookingError::conflict(
            conflicts.into_iter().map(Commitment::to_ref).collect(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

/// A staged cart backed by a `CartStore`. Every change is written through.
#[derive(Debug)]
pub struct Cart<S: CartStore> {
    store: S,
    items: Vec<CartItem>,
}

impl<S: CartStore> Cart<S> {
    /// Load whatever the store holds.
    pub fn new(store: S) -> Result<Self, CartStoreError> {
        let items = store.load()?;
        Ok(Cart { store, items })
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stage `item` after the duplicate and conflict checks. Insertion order
    /// is display order.
    pub fn add(&mut self, item: CartItem, bookings: &[Booking]) -> Result<(), BookingError> {
        stage(&item, &self.items, bookings)?;
        self.items.push(item);
        self.store.save(&self.items)?;
        Ok(())
    }

    /// Remove the item at `index`; out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Result<Option<CartItem>, CartStoreError> {
        if index >= self.items.len() {
            return Ok(None);
        }
        let removed = self.items.remove(index);
        self.store.save(&self.items)?;
        Ok(Some(removed))
    }

    pub fn clear(&mut self) -> Result<(), CartStoreError> {
        self.items.clear();
        self.store.clear()
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.total_price).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
