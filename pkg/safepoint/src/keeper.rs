use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use pkg_constants::safepoint::{CHECK_GC_SAFE_POINT_GAP, PRE_UPDATE_SERVICE_SAFE_POINT_FACTOR};
use pkg_pd::PdClient;
use pkg_types::safepoint::ServiceSafePoint;

use crate::abort::AbortHandler;
use crate::error::SafePointError;
use crate::gc::check_gc_safe_point;
use crate::service::update_service_safe_point;

/// Keeps one backup's service safe point alive and watches the GC safe point.
///
/// Renews the service safe point every `ttl / 3` and checks the global GC
/// safe point every 5s, one call at a time on a single task.
pub struct ServiceSafePointKeeper {
    pd: Arc<dyn PdClient>,
    safe_point: ServiceSafePoint,
    update_interval: Duration,
    check_interval: Duration,
    abort: Option<Arc<dyn AbortHandler>>,
}

impl ServiceSafePointKeeper {
    pub fn new(pd: Arc<dyn PdClient>, safe_point: ServiceSafePoint) -> Result<Self, SafePointError> {
        if safe_point.ttl <= 0 {
            return Err(SafePointError::InvalidTtl(safe_point.ttl));
        }
        let update_interval =
            Duration::from_secs(safe_point.ttl as u64) / PRE_UPDATE_SERVICE_SAFE_POINT_FACTOR;

        Ok(Self {
            pd,
            safe_point,
            update_interval,
            check_interval: CHECK_GC_SAFE_POINT_GAP,
            abort: None,
        })
    }

    /// Override the GC check period. A zero period is ignored.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("Ignoring zero GC check interval, keeping {:?}", self.check_interval);
        } else {
            self.check_interval = interval;
        }
        self
    }

    /// Handler invoked when the GC safe point passes the backup TS.
    pub fn with_abort_handler(mut self, abort: Arc<dyn AbortHandler>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    async fn update(&self) {
        if let Err(e) = update_service_safe_point(self.pd.as_ref(), &self.safe_point).await {
            warn!(
                "Failed to update service safe point, backup may fail if gc triggered: {}",
                e
            );
        }
    }

    async fn check(&self) -> Result<(), SafePointError> {
        check_gc_safe_point(self.pd.as_ref(), self.safe_point.backup_ts).await
    }

    /// Register the service safe point, then keep it alive on a background task.
    ///
    /// The first renewal is awaited before this returns, so the backup never
    /// reads unprotected. The task ends with `Ok(())` once `shutdown` turns
    /// `true` (or its sender is dropped), and with
    /// [`SafePointError::GcSafePointExceeded`] after calling the abort handler.
    pub async fn start(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<(), SafePointError>> {
        let mut update_tick = ticker(self.update_interval);
        let mut check_tick = ticker(self.check_interval);
        self.update().await;

        tokio::spawn(async move {
            info!(
                "ServiceSafePointKeeper started ({}, renew={:?}, check={:?})",
                self.safe_point, self.update_interval, self.check_interval
            );
            if *shutdown.borrow_and_update() {
                debug!("Service safe point keeper exited");
                return Ok(());
            }

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow_and_update() {
                            debug!("Service safe point keeper exited");
                            return Ok(());
                        }
                    }
                    _ = update_tick.tick() => {
                        self.update().await;
                    }
                    _ = check_tick.tick() => {
                        if let Err(e) = self.check().await {
                            error!(
                                "Cannot pass GC safe point check, aborting: {} ({})",
                                e, self.safe_point
                            );
                            if let Some(abort) = &self.abort {
                                abort.abort(&self.safe_point, &e);
                            }
                            return Err(e);
                        }
                    }
                }
            }
        })
    }
}

/// Periodic timer whose first tick is one full `period` from now.
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Start a keeper with the default intervals and no abort handler.
pub async fn start_service_safe_point_keeper(
    pd: Arc<dyn PdClient>,
    safe_point: ServiceSafePoint,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<Result<(), SafePointError>>, SafePointError> {
    let keeper = ServiceSafePointKeeper::new(pd, safe_point)?;
    Ok(keeper.start(shutdown).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{LogCapture, RecordingAbort};
    use pkg_pd::{MemoryPd, ServiceUpdate};

    fn keeper(pd: &MemoryPd, ttl: i64, backup_ts: u64) -> ServiceSafePointKeeper {
        let sp = ServiceSafePoint::with_id("br-a", ttl, backup_ts);
        ServiceSafePointKeeper::new(Arc::new(pd.clone()), sp).unwrap()
    }

    async fn sleep_secs(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[test]
    fn test_update_interval_is_a_third_of_ttl() {
        let pd = MemoryPd::new();
        assert_eq!(keeper(&pd, 300, 1).update_interval(), Duration::from_secs(100));
        assert_eq!(keeper(&pd, 600, 1).update_interval(), Duration::from_secs(200));
        assert_eq!(
            keeper(&pd, 5, 1).update_interval(),
            Duration::from_nanos(1_666_666_666)
        );
        assert_eq!(keeper(&pd, 5, 1).check_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_non_positive_ttl_is_rejected() {
        let pd = MemoryPd::new();
        for ttl in [0, -1, -300] {
            let sp = ServiceSafePoint::with_id("br-a", ttl, 1000);
            let err = ServiceSafePointKeeper::new(Arc::new(pd.clone()), sp)
                .err()
                .unwrap();
            assert_eq!(err, SafePointError::InvalidTtl(ttl));
        }
    }

    #[test]
    fn test_zero_check_interval_is_ignored() {
        let pd = MemoryPd::new();
        let k = keeper(&pd, 300, 1).with_check_interval(Duration::ZERO);
        assert_eq!(k.check_interval(), Duration::from_secs(5));
        let k = k.with_check_interval(Duration::from_secs(1));
        assert_eq!(k.check_interval(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_ttl_makes_no_pd_call() {
        let pd = MemoryPd::new();
        let (_tx, rx) = watch::channel(false);
        let sp = ServiceSafePoint::with_id("br-a", 0, 1000);
        let res = start_service_safe_point_keeper(Arc::new(pd.clone()), sp, rx).await;
        assert!(matches!(res, Err(SafePointError::InvalidTtl(0))));
        assert!(pd.service_updates().await.is_empty());
        assert_eq!(pd.gc_queries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_before_start_returns_and_renews_on_schedule() {
        let pd = MemoryPd::new();
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 600, 1000).start(rx).await;

        // Exactly one renewal, before any timer-driven call.
        let first = ServiceUpdate {
            service_id: "br-a".to_string(),
            ttl: 600,
            safe_point: 999,
        };
        assert_eq!(pd.service_updates().await, vec![first.clone()]);
        assert_eq!(pd.gc_queries().await, 0);

        sleep_secs(199.0).await;
        assert_eq!(pd.service_updates().await.len(), 1);
        assert_eq!(pd.gc_queries().await, 39);

        sleep_secs(2.0).await;
        assert_eq!(pd.service_updates().await, vec![first.clone(), first]);
        assert_eq!(pd.gc_queries().await, 40);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_ttl_renews_more_often_than_check() {
        let pd = MemoryPd::new();
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 6, 1000).start(rx).await;

        sleep_secs(5.5).await;
        // Startup + ticks at 2s and 4s; one check at 5s.
        assert_eq!(pd.service_updates().await.len(), 3);
        assert_eq!(pd.gc_queries().await, 1);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewals_do_not_stop_keeper() {
        let logs = LogCapture::default();
        let _guard = logs.install();
        let pd = MemoryPd::new();
        pd.set_unavailable(true).await;
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 300, 1000).start(rx).await;

        sleep_secs(250.0).await;
        assert_eq!(pd.service_updates().await.len(), 3);
        assert!(pd.service_safe_points().await.is_empty());
        assert!(!handle.is_finished());
        let out = logs.contents();
        assert_eq!(
            out.matches("Failed to update service safe point, backup may fail if gc triggered")
                .count(),
            3
        );
        assert!(out.contains("memory pd is down"));

        pd.set_unavailable(false).await;
        sleep_secs(51.0).await;
        assert_eq!(pd.service_updates().await.len(), 4);
        assert_eq!(pd.service_safe_points().await.len(), 1);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_registers_and_stops() {
        let pd = MemoryPd::new();
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 10_000_000_000_000, 1000).start(rx).await;

        sleep_secs(10.0).await;
        let live = pd.service_safe_points().await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].safe_point, 999);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_exceeded_aborts() {
        let pd = MemoryPd::new();
        pd.update_gc_safe_point(1500).await.unwrap();
        let abort = Arc::new(RecordingAbort::default());
        let (_tx, rx) = watch::channel(false);

        let started = Instant::now();
        let handle = keeper(&pd, 600, 1000)
            .with_abort_handler(abort.clone())
            .start(rx)
            .await;
        let res = handle.await.unwrap();

        let exceeded = SafePointError::GcSafePointExceeded {
            safe_point: 1500,
            ts: 1000,
        };
        assert_eq!(res, Err(exceeded.clone()));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(abort.calls(), vec![("br-a".to_string(), exceeded)]);

        // Timers are gone with the task.
        let updates = pd.service_updates().await.len();
        sleep_secs(600.0).await;
        assert_eq!(pd.service_updates().await.len(), updates);
        assert_eq!(pd.gc_queries().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_passing_mid_backup_is_caught_on_next_check() {
        let pd = MemoryPd::new();
        let abort = Arc::new(RecordingAbort::default());
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();
        let handle = keeper(&pd, 600, 1000)
            .with_abort_handler(abort.clone())
            .start(rx)
            .await;

        sleep_secs(12.0).await;
        assert!(abort.calls().is_empty());
        pd.update_gc_safe_point(1000).await.unwrap();

        let res = handle.await.unwrap();
        assert_eq!(
            res,
            Err(SafePointError::GcSafePointExceeded {
                safe_point: 1000,
                ts: 1000
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert_eq!(abort.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_pd_never_aborts() {
        let pd = MemoryPd::new();
        pd.update_gc_safe_point(1500).await.unwrap();
        pd.set_unavailable(true).await;
        let abort = Arc::new(RecordingAbort::default());
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 600, 1000)
            .with_abort_handler(abort.clone())
            .start(rx)
            .await;

        sleep_secs(60.0).await;
        assert!(!handle.is_finished());
        assert!(abort.calls().is_empty());

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_ticks_stops_cleanly() {
        let pd = MemoryPd::new();
        let abort = Arc::new(RecordingAbort::default());
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 30, 1000)
            .with_abort_handler(abort.clone())
            .start(rx)
            .await;

        sleep_secs(12.0).await;
        assert_eq!(pd.service_updates().await.len(), 2);
        assert_eq!(pd.gc_queries().await, 2);

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));

        sleep_secs(120.0).await;
        assert_eq!(pd.service_updates().await.len(), 2);
        assert_eq!(pd.gc_queries().await, 2);
        assert!(abort.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_keeper() {
        let pd = MemoryPd::new();
        let (tx, rx) = watch::channel(false);
        let handle = keeper(&pd, 30, 1000).start(rx).await;

        sleep_secs(3.0).await;
        drop(tx);
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(pd.service_updates().await.len(), 1);
        assert_eq!(pd.gc_queries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_registers_once_and_exits() {
        let pd = MemoryPd::new();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let handle = keeper(&pd, 30, 1000).start(rx).await;
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(pd.service_updates().await.len(), 1);
        assert_eq!(pd.gc_queries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepers_share_one_client() {
        let pd = MemoryPd::new();
        let client: Arc<dyn PdClient> = Arc::new(pd.clone());
        let (tx, rx) = watch::channel(false);

        let a = ServiceSafePoint::new(60, 1000);
        let b = ServiceSafePoint::new(60, 2000);
        assert_ne!(a.id, b.id);
        let ha = start_service_safe_point_keeper(client.clone(), a, rx.clone())
            .await
            .unwrap();
        let hb = start_service_safe_point_keeper(client, b, rx).await.unwrap();

        sleep_secs(1.0).await;
        let live = pd.service_safe_points().await;
        assert_eq!(live.len(), 2);
        assert_eq!(pd.run_gc(5000).await, 999);

        tx.send(true).unwrap();
        assert_eq!(ha.await.unwrap(), Ok(()));
        assert_eq!(hb.await.unwrap(), Ok(()));
    }
}
