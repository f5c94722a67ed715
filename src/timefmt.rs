//! Elapsed-time labels for citation timestamps.
//!
//! Stored timestamps must carry their own offset. The instant is taken as-is
//! and converted to UTC; its wall-clock fields are never reinterpreted in
//! another timezone. A value without an offset is rejected instead of being
//! guessed at.
//!
//! Minutes and hours both use half-up rounding: 89.5 s is 1 minute, 29.9 s
//! is "just now", 90 minutes is 2 hours.

use chrono::{DateTime, Utc};

use crate::error::FeedError;

pub const NO_DATA_LABEL: &str = "No data yet";

pub fn parse_citation_timestamp(raw: &str) -> Result<DateTime<Utc>, FeedError> {
    let value = raw.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|_| FeedError::MalformedTimestamp {
            value: raw.to_string(),
        })
}

/// Whole minutes between `instant` and `now`, rounded half up.
/// Negative when `instant` lies in the future.
pub fn elapsed_minutes(instant: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - instant).num_milliseconds();
    (millis + 30_000).div_euclid(60_000)
}

pub fn relative_label(instant: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = elapsed_minutes(instant, now);
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes} min. ago");
    }

    let hours = (minutes + 30).div_euclid(60);
    let unit = if hours == 1 { "hr." } else { "hrs." };
    format!("{hours} {unit} ago")
}
