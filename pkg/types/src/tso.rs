//! Helpers for 64-bit TSO timestamps: physical milliseconds in the high bits,
//! an 18-bit logical counter in the low bits.

use chrono::{DateTime, Utc};
use pkg_constants::tso::{LOGICAL_BITS_MASK, PHYSICAL_SHIFT_BITS};

/// Build a TSO from a physical time in milliseconds and a logical counter.
pub fn compose_ts(physical_ms: u64, logical: u64) -> u64 {
    (physical_ms << PHYSICAL_SHIFT_BITS) | (logical & LOGICAL_BITS_MASK)
}

/// Physical part of a TSO, in milliseconds since the Unix epoch.
pub fn extract_physical(ts: u64) -> u64 {
    ts >> PHYSICAL_SHIFT_BITS
}

/// Logical counter of a TSO.
pub fn extract_logical(ts: u64) -> u64 {
    ts & LOGICAL_BITS_MASK
}

/// Split a TSO into wall-clock time and logical counter.
pub fn parse_ts(ts: u64) -> (DateTime<Utc>, u64) {
    let physical = extract_physical(ts) as i64;
    let time = DateTime::from_timestamp_millis(physical).unwrap_or_default();
    (time, extract_logical(ts))
}

/// TSO for a wall-clock time, with a zero logical counter.
pub fn ts_from_time(time: DateTime<Utc>) -> u64 {
    compose_ts(time.timestamp_millis().max(0) as u64, 0)
}
