use pkg_pd::PdClient;
use pkg_types::safepoint::ServiceSafePoint;
use tracing::{debug, warn};

use crate::error::SafePointError;

/// Register `backup_ts - 1` with PD as service safe point `sp.id`, locking
/// down the backup TS for `sp.ttl` seconds.
///
/// If PD answers with a minimum above what was submitted, the reservation was
/// refused or lost. That is logged but not returned as an error; the GC check
/// decides whether the backup is actually broken.
pub async fn update_service_safe_point(
    pd: &dyn PdClient,
    sp: &ServiceSafePoint,
) -> Result<(), SafePointError> {
    debug!("Update PD safe point limit with TTL: {}", sp);

    let safe_point = sp.safe_point();
    let last_safe_point = pd
        .update_service_gc_safe_point(&sp.id, sp.ttl, safe_point)
        .await?;
    if last_safe_point > safe_point {
        warn!(
            "Service GC safe point lost, we may fail to back up if GC lifetime isn't long enough (last_safe_point={}, {})",
            last_safe_point, sp
        );
    }
    Ok(())
}
