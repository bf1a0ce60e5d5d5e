//! Boundary to the coordination service (PD) that owns the GC safe point.

pub mod client;
pub mod memory;

pub use client::{PdClient, PdError, TimeoutPd};
pub use memory::{MemoryPd, ServiceSafePointEntry, ServiceUpdate};
