use pkg_pd::PdError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafePointError {
    /// GC already reached the protected timestamp. Versions the backup needs
    /// may be gone, so this is never retried.
    #[error("GC safepoint {safe_point} exceed TS {ts}")]
    GcSafePointExceeded { safe_point: u64, ts: u64 },

    #[error(transparent)]
    Pd(#[from] PdError),

    #[error("service safe point ttl must be positive (got {0})")]
    InvalidTtl(i64),
}
