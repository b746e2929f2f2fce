use serde::Serialize;

use crate::conflict::CommitmentRef;
use crate::lifecycle::Transition;
use crate::model::BookingStatus;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Everything the booking core can refuse. None of these are retried
/// internally; the caller decides whether to change the request.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    /// The proposed window overlaps existing confirmed commitments.
    /// `conflicts` may be empty when the backend rejected the write itself.
    #[error("Time conflict: {detail}")]
    Conflict {
        conflicts: Vec<CommitmentRef>,
        detail: String,
    },

    #[error("Cannot {action} a booking that is {from}")]
    InvalidTransition {
        from: BookingStatus,
        action: Transition,
    },

    #[error("{0} is already in your cart")]
    Duplicate(String),

    #[error("Cannot cancel bookings within {cutoff_hours} hours of start time ({minutes_until_start} minutes left)")]
    CancellationWindowClosed {
        cutoff_hours: i64,
        minutes_until_start: i64,
    },

    #[error("Not allowed to {0}")]
    Forbidden(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Cart storage failed: {0}")]
    CartStore(#[from] crate::cart::CartStoreError),

    #[error("Backend error: {0}")]
    Store(#[source] StoreError),
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::Validation(vec![msg.into()])
    }

    /// Build a conflict error from the matched commitments, describing the
    /// first one for display.
    pub fn conflict(conflicts: Vec<CommitmentRef>) -> Self {
        let detail = match conflicts.first() {
            Some(first) if conflicts.len() == 1 => format!("already booked {}", first.describe()),
            Some(first) => format!(
                "already booked {} and {} more",
                first.describe(),
                conflicts.len() - 1
            ),
            None => "overlaps an existing booking".to_string(),
        };
        BookingError::Conflict { conflicts, detail }
    }

    /// Stable machine-readable tag, used by the CLI and node bindings.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation",
            BookingError::Conflict { .. } => "conflict",
            BookingError::InvalidTransition { .. } => "invalidTransition",
            BookingError::Duplicate(_) => "duplicate",
            BookingError::CancellationWindowClosed { .. } => "cancellationWindowClosed",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::NotFound { .. } => "notFound",
            BookingError::CartStore(_) => "cartStore",
            BookingError::Store(_) => "store",
        }
    }

    /// Conflicting commitments carried by a `Conflict`, empty otherwise.
    pub fn conflicts(&self) -> &[CommitmentRef] {
        match self {
            BookingError::Conflict { conflicts, .. } => conflicts,
            _ => &[],
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            // The backend's own no-overlap check won the race against ours.
            StoreError::Conflict(detail) => BookingError::Conflict {
                conflicts: Vec::new(),
                detail,
            },
            StoreError::NotFound { kind, id } => BookingError::NotFound { kind, id },
            other => BookingError::Store(other),
        }
    }
}

/// Serializable view of a `BookingError` for JSON envelopes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<CommitmentRef>,
}

impl From<&BookingError> for ErrorReport {
    fn from(e: &BookingError) -> Self {
        ErrorReport {
            kind: e.kind(),
            message: e.to_string(),
            conflicts: e.conflicts().to_vec(),
        }
    }
}
