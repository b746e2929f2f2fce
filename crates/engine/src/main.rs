use std::io::{self, Read, Write};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use bookwell_engine::conflict::{
    audit_double_bookings, event_resource_conflicts, find_conflicts, first_conflict, Commitment,
    CommitmentRef, OverlapRule, Scope,
};
use bookwell_engine::lifecycle::{self, Clock, SystemClock};
use bookwell_engine::model::{Actor, Booking, CartItem, Event, RecurrencePattern, Resource};
use bookwell_engine::store::ListResponse;
use bookwell_engine::{cart, recurrence, resolve, validator, window};
use bookwell_engine::{BookingError, EngineConfig, ErrorReport, TimeWindow};

const LOG_ENV: &str = "BOOKWELL_LOG";

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Request {
    /// Commitments overlapping `candidate` for `scope`. Callers pass only the
    /// records that should block.
    #[serde(rename_all = "camelCase")]
    CheckConflicts {
        candidate: TimeWindow,
        scope: Scope,
        #[serde(default = "empty_list")]
        bookings: ListResponse<Booking>,
        #[serde(default = "empty_list")]
        events: ListResponse<Event>,
        exclude_id: Option<String>,
        #[serde(default)]
        rule: OverlapRule,
        #[serde(default)]
        first_only: bool,
    },
    #[serde(rename_all = "camelCase")]
    EventConflicts {
        draft: Event,
        #[serde(default = "empty_list")]
        events: ListResponse<Event>,
        #[serde(default = "empty_list")]
        resources: ListResponse<Resource>,
    },
    #[serde(rename_all = "camelCase")]
    ExpandRecurrence {
        base: Event,
        #[serde(default)]
        pattern: RecurrencePattern,
        until: NaiveDate,
        series_id: Option<String>,
    },
    /// Returns the cart with `item` appended.
    #[serde(rename_all = "camelCase")]
    Stage {
        item: CartItem,
        #[serde(default)]
        cart: Vec<CartItem>,
        #[serde(default = "empty_list")]
        bookings: ListResponse<Booking>,
    },
    #[serde(rename_all = "camelCase")]
    Approve {
        booking: Booking,
        actor: Actor,
        #[serde(default = "empty_list")]
        bookings: ListResponse<Booking>,
        #[serde(default, with = "window::lenient::option")]
        now: Option<NaiveDateTime>,
    },
    #[serde(rename_all = "camelCase")]
    Reject {
        booking: Booking,
        actor: Actor,
        #[serde(default)]
        reason: String,
        #[serde(default, with = "window::lenient::option")]
        now: Option<NaiveDateTime>,
    },
    #[serde(rename_all = "camelCase")]
    Cancel {
        booking: Booking,
        actor: Actor,
        #[serde(default, with = "window::lenient::option")]
        now: Option<NaiveDateTime>,
        config: Option<EngineConfig>,
    },
    #[serde(rename_all = "camelCase")]
    CanCancel {
        #[serde(with = "window::lenient")]
        start: NaiveDateTime,
        #[serde(default, with = "window::lenient::option")]
        now: Option<NaiveDateTime>,
        config: Option<EngineConfig>,
    },
    #[serde(rename_all = "camelCase")]
    ValidateEvent {
        draft: Event,
        #[serde(default = "empty_list")]
        resources: ListResponse<Resource>,
    },
    /// Active, past and cancelled bookings with display names resolved.
    #[serde(rename_all = "camelCase")]
    MyBookings {
        #[serde(default = "empty_list")]
        bookings: ListResponse<Booking>,
        #[serde(default = "empty_list")]
        events: ListResponse<Event>,
        #[serde(default = "empty_list")]
        resources: ListResponse<Resource>,
        #[serde(default, with = "window::lenient::option")]
        now: Option<NaiveDateTime>,
    },
    #[serde(rename_all = "camelCase")]
    Audit {
        #[serde(default = "empty_list")]
        bookings: ListResponse<Booking>,
    },
}

fn empty_list<T>() -> ListResponse<T> {
    ListResponse::Bare(Vec::new())
}

#[derive(Debug, Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    conflicts: Vec<CommitmentRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelCheck {
    allowed: bool,
    minutes_until_start: i64,
    cutoff_hours: i64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // stdout carries the JSON protocol; logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn write_ok<T: Serialize>(data: T) {
    let resp = OkResponse { ok: true, data };
    let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
        format!("{{\"ok\":false,\"error\":\"serialization error: {}\"}}", e)
    });
    println!("{}", json);
    let _ = io::stdout().flush();
}

fn emit_err(resp: ErrResponse) -> ! {
    let json = serde_json::to_string(&resp).unwrap_or_else(|_| {
        "{\"ok\":false,\"error\":\"double serialization error\"}".to_string()
    });
    println!("{}", json);
    let _ = io::stdout().flush();
    std::process::exit(1);
}

fn write_err(msg: impl std::fmt::Display) -> ! {
    emit_err(ErrResponse {
        ok: false,
        error: msg.to_string(),
        kind: None,
        conflicts: Vec::new(),
    })
}

fn write_booking_err(e: &BookingError) -> ! {
    let report = ErrorReport::from(e);
    emit_err(ErrResponse {
        ok: false,
        error: report.message,
        kind: Some(report.kind),
        conflicts: report.conflicts,
    })
}

fn respond<T: Serialize>(result: Result<T, BookingError>) {
    match result {
        Ok(data) => write_ok(data),
        Err(e) => write_booking_err(&e),
    }
}

fn now_or_system(now: Option<NaiveDateTime>) -> NaiveDateTime {
    now.unwrap_or_else(|| SystemClock.now())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    init_tracing();

    // Read all of stdin
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        write_err(format!("Failed to read stdin: {}", e));
    }

    // Parse request
    let request: Request = match serde_json::from_str(&input) {
        Ok(r) => r,
        Err(e) => write_err(format!("Invalid JSON input: {}", e)),
    };

    match request {
        Request::CheckConflicts {
            candidate,
            scope,
            bookings,
            events,
            exclude_id,
            rule,
            first_only,
        } => {
            let bookings = bookings.into_vec();
            let events = events.into_vec();
            let exclude = exclude_id.as_deref();
            let found: Vec<CommitmentRef> = if first_only {
                first_conflict(&candidate, &scope, &bookings, exclude, rule)
                    .map(Commitment::to_ref)
                    .or_else(|| {
                        first_conflict(&candidate, &scope, &events, exclude, rule)
                            .map(Commitment::to_ref)
                    })
                    .into_iter()
                    .collect()
            } else {
                find_conflicts(&candidate, &scope, &bookings, exclude, rule)
                    .into_iter()
                    .map(Commitment::to_ref)
                    .chain(
                        find_conflicts(&candidate, &scope, &events, exclude, rule)
                            .into_iter()
                            .map(Commitment::to_ref),
                    )
                    .collect()
            };
            write_ok(found);
        }
        Request::EventConflicts {
            draft,
            events,
            resources,
        } => {
            write_ok(event_resource_conflicts(
                &draft,
                &events.into_vec(),
                &resources.into_vec(),
            ));
        }
        Request::ExpandRecurrence {
            base,
            pattern,
            until,
            series_id,
        } => {
            let series = match series_id {
                Some(id) => recurrence::expand_with_series_id(&base, pattern, until, &id),
                None => recurrence::expand(&base, pattern, until),
            };
            if series.is_empty() {
                write_booking_err(&BookingError::validation(
                    "Recurrence end date is before the first occurrence",
                ));
            }
            write_ok(series);
        }
        Request::Stage {
            item,
            mut cart,
            bookings,
        } => {
            let result = cart::stage(&item, &cart, &bookings.into_vec()).map(|()| {
                cart.push(item);
                cart
            });
            respond(result);
        }
        Request::Approve {
            mut booking,
            actor,
            bookings,
            now,
        } => {
            let result = lifecycle::approve(
                &mut booking,
                &actor,
                &bookings.into_vec(),
                now_or_system(now),
            )
            .map(|()| booking);
            respond(result);
        }
        Request::Reject {
            mut booking,
            actor,
            reason,
            now,
        } => {
            let result = lifecycle::reject(&mut booking, &actor, &reason, now_or_system(now))
                .map(|()| booking);
            respond(result);
        }
        Request::Cancel {
            mut booking,
            actor,
            now,
            config,
        } => {
            let config = config.unwrap_or_else(EngineConfig::from_env);
            let result = config.cutoff().and_then(|cutoff| {
                lifecycle::cancel(&mut booking, &actor, now_or_system(now), cutoff)
            });
            respond(result.map(|()| booking));
        }
        Request::CanCancel { start, now, config } => {
            let config = config.unwrap_or_else(EngineConfig::from_env);
            let now = now_or_system(now);
            let result = config.cutoff().map(|cutoff| CancelCheck {
                allowed: lifecycle::can_cancel(start, now, cutoff),
                minutes_until_start: (start - now).num_minutes(),
                cutoff_hours: config.cancellation_cutoff_hours,
            });
            respond(result);
        }
        Request::ValidateEvent { draft, resources } => {
            write_ok(validator::validate_event(&draft, &resources.into_vec()));
        }
        Request::MyBookings {
            bookings,
            events,
            resources,
            now,
        } => {
            let bookings = bookings.into_vec();
            let events = events.into_vec();
            let resources = resources.into_vec();
            let buckets = resolve::partition_bookings(&bookings, now_or_system(now))
                .map(|b| resolve::describe(b, &events, &resources));
            write_ok(buckets);
        }
        Request::Audit { bookings } => {
            write_ok(audit_double_bookings(&bookings.into_vec()));
        }
    }
}
