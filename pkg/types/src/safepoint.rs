use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use pkg_constants::safepoint::SERVICE_SAFE_POINT_ID_PREFIX;

use crate::tso;

/// A service safe point registered by one backup instance.
///
/// PD stores it under `id` and keeps every version above `backup_ts - 1`
/// readable until `ttl` seconds pass without a renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSafePoint {
    /// Reservation key in PD (e.g. "br-0f8d...")
    pub id: String,
    /// Reservation time-to-live in seconds
    pub ttl: i64,
    /// The snapshot timestamp being protected
    pub backup_ts: u64,
}

impl ServiceSafePoint {
    /// Build a reservation with a freshly generated id.
    pub fn new(ttl: i64, backup_ts: u64) -> Self {
        Self::with_id(make_safe_point_id(), ttl, backup_ts)
    }

    pub fn with_id(id: impl Into<String>, ttl: i64, backup_ts: u64) -> Self {
        Self {
            id: id.into(),
            ttl,
            backup_ts,
        }
    }

    /// The value submitted to PD. One tick below `backup_ts` so the
    /// protected timestamp itself stays readable.
    pub fn safe_point(&self) -> u64 {
        self.backup_ts.saturating_sub(1)
    }

    /// Physical time encoded in `backup_ts`.
    pub fn backup_time(&self) -> DateTime<Utc> {
        tso::parse_ts(self.backup_ts).0
    }
}

impl fmt::Display for ServiceSafePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} ttl={} backup_time={} backup_ts={}",
            self.id,
            format_ttl(self.ttl),
            self.backup_time().to_rfc3339(),
            self.backup_ts
        )
    }
}

/// Make a unique safe point id, to reduce name conflicts between backups.
pub fn make_safe_point_id() -> String {
    format!("{}{}", SERVICE_SAFE_POINT_ID_PREFIX, Uuid::new_v4())
}

/// Render a TTL in seconds as `1h2m3s` / `5m0s` / `20s`.
fn format_ttl(ttl: i64) -> String {
    let sign = if ttl < 0 { "-" } else { "" };
    let secs = ttl.unsigned_abs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}{}h{}m{}s", sign, h, m, s)
    } else if m > 0 {
        format!("{}{}m{}s", sign, m, s)
    } else {
        format!("{}{}s", sign, s)
    }
}
