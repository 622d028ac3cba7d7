//! Subscription cursor - the "since" watermark of a polling subscription.

use std::cmp::Ordering;

use chrono::Utc;
use shared_types::{format_timestamp, parse_timestamp, Timestamped};

/// Timestamp of the newest item delivered so far.
///
/// Only ever moves forward. Timestamps that do not parse are compared as
/// strings, which still orders the server's fixed-width layout correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    value: String,
}

impl Cursor {
    /// Starts at `since`, or at the current time when none is given.
    pub fn new(since: Option<&str>) -> Self {
        let value = match since.map(str::trim) {
            Some(since) if !since.is_empty() => since.to_string(),
            _ => format_timestamp(Utc::now()),
        };
        Self { value }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Moves to `timestamp` if it is newer. Returns whether it moved.
    pub fn advance(&mut self, timestamp: &str) -> bool {
        if timestamp.is_empty() || compare(timestamp, &self.value) != Ordering::Greater {
            return false;
        }
        self.value = timestamp.to_string();
        true
    }

    /// Advances past every item in `items`.
    pub fn advance_past<T: Timestamped>(&mut self, items: &[T]) -> bool {
        items
            .iter()
            .fold(false, |moved, item| self.advance(item.timestamp()) || moved)
    }
}

fn compare(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}
