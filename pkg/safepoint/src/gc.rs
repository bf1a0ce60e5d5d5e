use pkg_constants::safepoint::GC_SAFE_POINT_PROBE;
use pkg_pd::{PdClient, PdError};
use tracing::warn;

use crate::error::SafePointError;

/// Returns the current GC safe point.
// TODO: read it through a get-only PD API once the client exposes one;
// probing with update_gc_safe_point assumes distributed GC is enabled.
async fn get_gc_safe_point(pd: &dyn PdClient) -> Result<u64, PdError> {
    pd.update_gc_safe_point(GC_SAFE_POINT_PROBE).await
}

/// Check whether `ts` is still above the GC safe point.
///
/// Only [`SafePointError::GcSafePointExceeded`] is ever returned. Failing to
/// read the safe point is logged and treated as a pass: this is a watchdog on
/// top of the service safe point, and one failed read is no reason to abort a
/// healthy backup.
pub async fn check_gc_safe_point(pd: &dyn PdClient, ts: u64) -> Result<(), SafePointError> {
    let safe_point = match get_gc_safe_point(pd).await {
        Ok(safe_point) => safe_point,
        Err(e) => {
            warn!("Failed to get GC safe point: {}", e);
            return Ok(());
        }
    };
    if ts <= safe_point {
        return Err(SafePointError::GcSafePointExceeded { safe_point, ts });
    }
    Ok(())
}
