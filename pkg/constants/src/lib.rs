//! Centralized constants for the backup safepoint keeper.
//!
//! All protocol-level constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod paths;
pub mod safepoint;
pub mod tso;
