//! TSO (timestamp oracle) bit layout.

/// Number of low bits holding the logical counter.
pub const PHYSICAL_SHIFT_BITS: u32 = 18;

/// Mask selecting the logical counter.
pub const LOGICAL_BITS_MASK: u64 = (1 << PHYSICAL_SHIFT_BITS) - 1;
