//! Publish-time timestamps.

use chrono::{DateTime, SecondsFormat, Utc};

/// UTC instant a reading was produced.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// RFC 3339 with millisecond precision, e.g. `2024-05-01T12:00:00.250Z`.
#[must_use]
pub fn format_millis(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
