#![deny(clippy::all)]

use napi_derive::napi;

use bookwell_engine::conflict as detector;
use bookwell_engine::model as engine;
use bookwell_engine::store::normalize_list;
use bookwell_engine::{cart, lifecycle, recurrence, validator, window};
use bookwell_engine::{BookingError, ErrorReport};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingType {
    Event,
    Resource,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlapRule {
    SameDay,
    Timestamp,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Resource,
    Event,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentKind {
    Booking,
    Event,
}

// ---------------------------------------------------------------------------
// Enum conversions: napi <-> engine
// ---------------------------------------------------------------------------

impl From<BookingType> for engine::BookingType {
    fn from(v: BookingType) -> Self {
        match v {
            BookingType::Event => engine::BookingType::Event,
            BookingType::Resource => engine::BookingType::Resource,
        }
    }
}

impl From<engine::BookingType> for BookingType {
    fn from(v: engine::BookingType) -> Self {
        match v {
            engine::BookingType::Event => BookingType::Event,
            engine::BookingType::Resource => BookingType::Resource,
        }
    }
}

impl From<RecurrencePattern> for engine::RecurrencePattern {
    fn from(v: RecurrencePattern) -> Self {
        match v {
            RecurrencePattern::Daily => engine::RecurrencePattern::Daily,
            RecurrencePattern::Weekly => engine::RecurrencePattern::Weekly,
            RecurrencePattern::Biweekly => engine::RecurrencePattern::Biweekly,
            RecurrencePattern::Monthly => engine::RecurrencePattern::Monthly,
        }
    }
}

impl From<OverlapRule> for detector::OverlapRule {
    fn from(v: OverlapRule) -> Self {
        match v {
            OverlapRule::SameDay => detector::OverlapRule::SameDay,
            OverlapRule::Timestamp => detector::OverlapRule::Timestamp,
        }
    }
}

impl From<detector::CommitmentKind> for CommitmentKind {
    fn from(v: detector::CommitmentKind) -> Self {
        match v {
            detector::CommitmentKind::Booking => CommitmentKind::Booking,
            detector::CommitmentKind::Event => CommitmentKind::Event,
        }
    }
}

// ---------------------------------------------------------------------------
// Mirror types
// ---------------------------------------------------------------------------

/// A time window as two ISO 8601 date-times.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TryFrom<TimeWindow> for window::TimeWindow {
    type Error = napi::Error;

    fn try_from(v: TimeWindow) -> napi::Result<Self> {
        Ok(window::TimeWindow::new(
            parse_datetime(&v.start)?,
            parse_datetime(&v.end)?,
        ))
    }
}

impl From<window::TimeWindow> for TimeWindow {
    fn from(v: window::TimeWindow) -> Self {
        TimeWindow {
            start: window::format_datetime(v.start),
            end: window::format_datetime(v.end),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: String,
}

impl From<Scope> for detector::Scope {
    fn from(v: Scope) -> Self {
        match v.kind {
            ScopeKind::Resource => detector::Scope::Resource(v.id),
            ScopeKind::Event => detector::Scope::Event(v.id),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct CommitmentRef {
    pub id: String,
    pub kind: CommitmentKind,
    pub window: TimeWindow,
    pub label: Option<String>,
}

impl From<detector::CommitmentRef> for CommitmentRef {
    fn from(v: detector::CommitmentRef) -> Self {
        CommitmentRef {
            id: v.id,
            kind: v.kind.into(),
            window: v.window.into(),
            label: v.label,
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct ResourceConflict {
    pub resource_id: String,
    pub resource_name: String,
    pub events: Vec<CommitmentRef>,
}

impl From<detector::ResourceConflict> for ResourceConflict {
    fn from(v: detector::ResourceConflict) -> Self {
        ResourceConflict {
            resource_id: v.resource_id,
            resource_name: v.resource_name,
            events: v.events.into_iter().map(Into::into).collect(),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct CartItem {
    #[napi(js_name = "type")]
    pub kind: BookingType,
    pub item_id: String,
    pub name: String,
    pub image: Option<String>,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub price_per_day: Option<f64>,
    pub total_price: f64,
    pub purpose: Option<String>,
    pub notes: Option<String>,
}

impl From<CartItem> for engine::CartItem {
    fn from(v: CartItem) -> Self {
        engine::CartItem {
            kind: v.kind.into(),
            item_id: v.item_id,
            name: v.name,
            image: v.image,
            start_date: v.start_date,
            start_time: v.start_time,
            end_time: v.end_time,
            price_per_day: v.price_per_day,
            total_price: v.total_price,
            purpose: v.purpose,
            notes: v.notes,
        }
    }
}

impl From<engine::CartItem> for CartItem {
    fn from(v: engine::CartItem) -> Self {
        CartItem {
            kind: v.kind.into(),
            item_id: v.item_id,
            name: v.name,
            image: v.image,
            start_date: v.start_date,
            start_time: v.start_time,
            end_time: v.end_time,
            price_per_day: v.price_per_day,
            total_price: v.total_price,
            purpose: v.purpose,
            notes: v.notes,
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<validator::ValidationResult> for ValidationResult {
    fn from(v: validator::ValidationResult) -> Self {
        ValidationResult {
            errors: v.errors,
            warnings: v.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> napi::Result<chrono::NaiveDateTime> {
    window::parse_datetime(s)
        .ok_or_else(|| napi::Error::from_reason(format!("Invalid date-time '{}'", s)))
}

/// Booking errors cross the boundary as a JSON `ErrorReport` in the reason,
/// so the host can branch on `kind` and show `conflicts`.
fn booking_error(e: BookingError) -> napi::Error {
    let report = ErrorReport::from(&e);
    let reason = serde_json::to_string(&report).unwrap_or_else(|_| e.to_string());
    napi::Error::from_reason(reason)
}

/// Records come from the backend as JSON, either a bare array or `{ data }`.
fn parse_list<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> napi::Result<Vec<T>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid {} JSON: {}", what, e)))?;
    normalize_list(value).map_err(|e| napi::Error::from_reason(format!("Invalid {}: {}", what, e)))
}

fn parse_one<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> napi::Result<T> {
    serde_json::from_str(json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid {}: {}", what, e)))
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// Whether two windows overlap. Defaults to the same-day rule.
#[napi]
pub fn windows_overlap(
    a: TimeWindow,
    b: TimeWindow,
    rule: Option<OverlapRule>,
) -> napi::Result<bool> {
    let a = window::TimeWindow::try_from(a)?;
    let b = window::TimeWindow::try_from(b)?;
    let rule: detector::OverlapRule = rule.map(Into::into).unwrap_or_default();
    Ok(rule.collides(&a, &b))
}

/// Whether a booking starting at `start` may be cancelled at `now`.
#[napi]
pub fn can_cancel(start: String, now: String, cutoff_hours: Option<u32>) -> napi::Result<bool> {
    let cutoff = chrono::Duration::hours(
        cutoff_hours
            .map(i64::from)
            .unwrap_or(lifecycle::DEFAULT_CANCELLATION_CUTOFF_HOURS),
    );
    Ok(lifecycle::can_cancel(
        parse_datetime(&start)?,
        parse_datetime(&now)?,
        cutoff,
    ))
}

/// Confirmed bookings in `bookings_json` that collide with `candidate`.
#[napi]
pub fn check_conflicts(
    candidate: TimeWindow,
    scope: Scope,
    bookings_json: String,
    exclude_id: Option<String>,
    rule: Option<OverlapRule>,
) -> napi::Result<Vec<CommitmentRef>> {
    let candidate = window::TimeWindow::try_from(candidate)?;
    let bookings: Vec<engine::Booking> = parse_list(&bookings_json, "bookings")?;
    let confirmed = bookings.iter().filter(|b| b.is_confirmed());
    let rule: detector::OverlapRule = rule.map(Into::into).unwrap_or_default();

    Ok(detector::find_conflicts(
        &candidate,
        &scope.into(),
        confirmed,
        exclude_id.as_deref(),
        rule,
    )
    .into_iter()
    .map(|b| detector::Commitment::to_ref(b).into())
    .collect())
}

/// Per-resource conflicts for an event draft against all other events.
#[napi]
pub fn event_resource_conflicts(
    draft_json: String,
    events_json: String,
    resources_json: String,
) -> napi::Result<Vec<ResourceConflict>> {
    let draft: engine::Event = parse_one(&draft_json, "event")?;
    let events: Vec<engine::Event> = parse_list(&events_json, "events")?;
    let resources: Vec<engine::Resource> = parse_list(&resources_json, "resources")?;
    Ok(detector::event_resource_conflicts(&draft, &events, &resources)
        .into_iter()
        .map(Into::into)
        .collect())
}

/// Expand a recurring event; returns the occurrences as a JSON array.
#[napi]
pub fn expand_recurrence(
    base_json: String,
    pattern: RecurrencePattern,
    until: String,
    series_id: Option<String>,
) -> napi::Result<String> {
    let base: engine::Event = parse_one(&base_json, "event")?;
    let until = parse_datetime(&until)?.date();
    let series = match series_id {
        Some(id) => recurrence::expand_with_series_id(&base, pattern.into(), until, &id),
        None => recurrence::expand(&base, pattern.into(), until),
    };
    if series.is_empty() {
        return Err(booking_error(BookingError::validation(
            "Recurrence end date is before the first occurrence",
        )));
    }
    serde_json::to_string(&series).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// Stage `item` into `cart`, returning the new cart.
#[napi]
pub fn stage_cart_item(
    item: CartItem,
    cart: Vec<CartItem>,
    bookings_json: String,
) -> napi::Result<Vec<CartItem>> {
    let item = engine::CartItem::from(item);
    let mut staged: Vec<engine::CartItem> = cart.into_iter().map(Into::into).collect();
    let bookings: Vec<engine::Booking> = parse_list(&bookings_json, "bookings")?;

    cart::stage(&item, &staged, &bookings).map_err(booking_error)?;
    staged.push(item);
    Ok(staged.into_iter().map(Into::into).collect())
}

/// Validate an event draft and return errors and warnings without saving.
#[napi]
pub fn validate_event(
    draft_json: String,
    resources_json: String,
) -> napi::Result<ValidationResult> {
    let draft: engine::Event = parse_one(&draft_json, "event")?;
    let resources: Vec<engine::Resource> = parse_list(&resources_json, "resources")?;
    Ok(validator::validate_event(&draft, &resources).into())
}
