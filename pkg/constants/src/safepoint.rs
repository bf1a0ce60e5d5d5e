//! Service safe point / keeper constants.

use std::time::Duration;

/// Prefix of every reservation id registered by a backup instance.
/// Full id = `SERVICE_SAFE_POINT_ID_PREFIX + uuid`.
pub const SERVICE_SAFE_POINT_ID_PREFIX: &str = "br-";

/// Default reservation TTL in seconds. PD keeps the safe point limit at least 5min.
pub const DEFAULT_BR_GC_SAFE_POINT_TTL: i64 = 5 * 60;

/// The reservation is renewed every `TTL / PRE_UPDATE_SERVICE_SAFE_POINT_FACTOR`.
pub const PRE_UPDATE_SERVICE_SAFE_POINT_FACTOR: u32 = 3;

/// How often the keeper compares the global GC safe point with the backup TS.
pub const CHECK_GC_SAFE_POINT_GAP: Duration = Duration::from_secs(5);

/// Probe value passed to `update_gc_safe_point` when only observing.
/// PD never moves the safe point backwards, so 0 leaves it untouched.
pub const GC_SAFE_POINT_PROBE: u64 = 0;

/// Process exit code used when the GC safe point passed the backup TS.
pub const EXIT_GC_EXCEEDED: i32 = 3;

/// Per-request timeout applied to PD calls made by the keeper binary.
pub const DEFAULT_PD_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Simulated GC worker defaults for `br-keeper simulate`.
pub const DEFAULT_GC_TICK_SECS: u64 = 10;
pub const DEFAULT_GC_LIFETIME_SECS: u64 = 10 * 60;
pub const DEFAULT_SIMULATE_RUN_SECS: u64 = 60;
