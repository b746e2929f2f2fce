use std::env;

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BookingError;
use crate::lifecycle::DEFAULT_CANCELLATION_CUTOFF_HOURS;
use crate::window;

pub const ENV_CUTOFF_HOURS: &str = "BOOKWELL_CANCELLATION_CUTOFF_HOURS";
pub const ENV_CHECK_SERIES: &str = "BOOKWELL_CHECK_SERIES_CONFLICTS";

/// Engine tunables. Every field has a default, so a partial JSON object is a
/// valid override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Bookings starting sooner than this cannot be cancelled.
    pub cancellation_cutoff_hours: i64,
    /// Used for staged resource items without a start time.
    #[serde(with = "window::hhmm")]
    pub default_start_time: NaiveTime,
    #[serde(with = "window::hhmm")]
    pub default_end_time: NaiveTime,
    /// Check each occurrence of a new recurring series against existing
    /// events, not just the first one.
    pub check_series_conflicts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cancellation_cutoff_hours: DEFAULT_CANCELLATION_CUTOFF_HOURS,
            default_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            default_end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
            check_series_conflicts: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `BOOKWELL_*` environment variables. Unparseable
    /// values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = EngineConfig::default();

        if let Some(raw) = lookup(ENV_CUTOFF_HOURS) {
            match raw.trim().parse::<i64>() {
                Ok(hours) if cutoff_from_hours(hours).is_some() => {
                    config.cancellation_cutoff_hours = hours
                }
                _ => warn!(var = ENV_CUTOFF_HOURS, value = %raw, "ignoring invalid cutoff"),
            }
        }
        if let Some(raw) = lookup(ENV_CHECK_SERIES) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.check_series_conflicts = true,
                "0" | "false" | "no" | "off" => config.check_series_conflicts = false,
                _ => warn!(var = ENV_CHECK_SERIES, value = %raw, "ignoring invalid flag"),
            }
        }

        config
    }

    /// The cancellation cutoff as a duration. Fails for negative or
    /// out-of-range hours, which only a JSON override can carry.
    pub fn cutoff(&self) -> Result<Duration, BookingError> {
        cutoff_from_hours(self.cancellation_cutoff_hours).ok_or_else(|| {
            BookingError::validation(format!(
                "cancellationCutoffHours must be a non-negative number of hours, got {}",
                self.cancellation_cutoff_hours
            ))
        })
    }
}

fn cutoff_from_hours(hours: i64) -> Option<Duration> {
    if hours < 0 {
        return None;
    }
    Duration::try_hours(hours)
}
