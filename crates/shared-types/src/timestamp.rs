//! Server timestamp format.
//!
//! DeviceHive timestamps are UTC without a zone suffix and carry up to
//! millisecond precision, e.g. `2016-04-21T10:15:03.120`.

use chrono::{DateTime, NaiveDateTime, Utc};

/// `strftime` layout used when rendering timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Layout accepted when parsing; the fraction is optional and of any width.
const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Renders `at` in the server's layout.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a server timestamp. A trailing `Z` is tolerated.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, PARSE_FORMAT).ok()
}
