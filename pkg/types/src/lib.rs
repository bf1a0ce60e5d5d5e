//! Shared data types for the backup safepoint keeper.

pub mod config;
pub mod safepoint;
pub mod tso;
pub mod validate;
