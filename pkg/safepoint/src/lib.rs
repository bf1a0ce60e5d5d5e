//! Service safepoint keeper: keeps a backup snapshot safe from GC while the
//! backup reads it.
//!
//! A backup registers a TTL-bounded service safe point with PD, renews it
//! every `ttl / 3`, and watches the global GC safe point every 5 seconds.
//! If GC ever reaches the backup TS the keeper stops and reports
//! [`SafePointError::GcSafePointExceeded`].

pub mod abort;
pub mod error;
pub mod gc;
pub mod keeper;
pub mod service;

pub use abort::AbortHandler;
pub use error::SafePointError;
pub use gc::check_gc_safe_point;
pub use keeper::{ServiceSafePointKeeper, start_service_safe_point_keeper};
pub use service::update_service_safe_point;
