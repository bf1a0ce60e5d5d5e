use pkg_types::safepoint::ServiceSafePoint;

use crate::error::SafePointError;

/// Invoked by the keeper once the GC safe point has passed the backup TS.
///
/// The keeper itself only stops; terminating the backup (or the whole
/// process) is up to the handler installed by the caller.
pub trait AbortHandler: Send + Sync {
    fn abort(&self, safe_point: &ServiceSafePoint, err: &SafePointError);
}
