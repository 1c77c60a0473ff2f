//! Utility functions for the matchmaking service

use chrono::{DateTime, Duration, Utc};

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds elapsed between two timestamps, clamped at zero
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    (later - earlier).num_seconds().max(0) as u64
}

/// `seconds` as a duration, saturating at the largest representable span
pub fn saturating_seconds(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Check whether at least `seconds` have passed since `since`
pub fn has_elapsed(since: DateTime<Utc>, now: DateTime<Utc>, seconds: u64) -> bool {
    now - since >= saturating_seconds(seconds)
}

/// Case-insensitive username comparison, matching the server's handling
pub fn same_username(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
