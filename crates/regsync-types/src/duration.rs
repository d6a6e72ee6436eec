//! Interval strings as written in sync documents.
//!
//! Accepted forms:
//! - `"1500"`: raw milliseconds
//! - `"500ms"`: milliseconds
//! - `"30s"`, `"5m"`, `"1h"`: seconds, minutes, hours (unit is case-insensitive)
//!
//! Anything else yields the caller's default.

use std::time::Duration;

/// Parses an interval string into milliseconds, falling back to `default_ms`.
pub fn parse_millis(value: &str, default_ms: u64) -> u64 {
    let value = value.trim();
    if value.is_empty() {
        return default_ms;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().unwrap_or(default_ms);
    }

    let lower = value.to_ascii_lowercase();
    let (digits, factor) = if let Some(n) = lower.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = lower.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = lower.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = lower.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        return default_ms;
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return default_ms;
    }
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
        .unwrap_or(default_ms)
}

/// Parses an optional interval string into a [`Duration`].
pub fn parse_interval(value: Option<&str>, default_ms: u64) -> Duration {
    Duration::from_millis(value.map_or(default_ms, |v| parse_millis(v, default_ms)))
}
