//! Utility functions for the REST client.
//!
//! This module provides helpers for:
//! - Retry delays with exponential backoff
//! - Building nested hrefs (`<parent>/<child>`)
//! - Ordering API version names the way loose version strings sort

use std::cmp::Ordering;
use std::time::Duration;

/// Exponential backoff delay calculation.
///
/// Returns `base_ms * 2^attempt`, with the exponent capped at 10.
///
/// # Examples
///
/// ```
/// use manageiq_client::client::exponential_backoff;
/// use std::time::Duration;
///
/// assert_eq!(exponential_backoff(2, 100), Duration::from_millis(400));
/// assert_eq!(exponential_backoff(3, 0), Duration::ZERO);
/// ```
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// Append a path segment to an href, inserting exactly one `/`.
///
/// ```
/// use manageiq_client::client::join_href;
///
/// assert_eq!(join_href("/api/vms/1", "tags"), "/api/vms/1/tags");
/// assert_eq!(join_href("/api/vms/1/", "tags"), "/api/vms/1/tags");
/// ```
pub fn join_href(parent: &str, segment: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, segment)
    } else {
        format!("{}/{}", parent, segment)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum VersionPart<'a> {
    Number(u64),
    Text(&'a str),
}

impl Ord for VersionPart<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VersionPart::Number(a), VersionPart::Number(b)) => a.cmp(b),
            (VersionPart::Text(a), VersionPart::Text(b)) => a.cmp(b),
            (VersionPart::Number(_), VersionPart::Text(_)) => Ordering::Less,
            (VersionPart::Text(_), VersionPart::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for VersionPart<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn version_parts(version: &str) -> Vec<VersionPart<'_>> {
    let mut parts = Vec::new();
    let bytes = version.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        let c = bytes[start];
        if c == b'.' {
            start += 1;
            continue;
        }
        let digit = c.is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end] != b'.' && bytes[end].is_ascii_digit() == digit {
            end += 1;
        }
        let run = &version[start..end];
        match run.parse::<u64>() {
            Ok(n) if digit => parts.push(VersionPart::Number(n)),
            _ => parts.push(VersionPart::Text(run)),
        }
        start = end;
    }

    parts
}

/// Compare two version names component by component.
///
/// Digit runs compare numerically and everything else lexically, so
/// `"10.0" > "3.1"` and `"2.1.0" > "2.1"`. A numeric part sorts before a
/// textual one.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    version_parts(a).cmp(&version_parts(b))
}
