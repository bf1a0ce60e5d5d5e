//! `br-keeper simulate`: a keeper protecting one backup TS against an
//! in-memory PD whose GC worker keeps pushing the safe point forward.

use chrono::Utc;
use clap::Args;
use pkg_constants::safepoint::{
    CHECK_GC_SAFE_POINT_GAP, DEFAULT_BR_GC_SAFE_POINT_TTL, DEFAULT_GC_LIFETIME_SECS,
    DEFAULT_GC_TICK_SECS, DEFAULT_PD_REQUEST_TIMEOUT, DEFAULT_SIMULATE_RUN_SECS, EXIT_GC_EXCEEDED,
};
use pkg_pd::{MemoryPd, PdClient, TimeoutPd};
use pkg_safepoint::{AbortHandler, SafePointError, ServiceSafePointKeeper};
use pkg_types::config::KeeperConfigFile;
use pkg_types::safepoint::{ServiceSafePoint, make_safe_point_id};
use pkg_types::tso;
use pkg_types::validate::{validate_safe_point_id, validate_ttl};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Args, Debug, Default)]
pub struct SimulateArgs {
    /// Service safe point id (default: a fresh `br-<uuid>`)
    #[arg(long)]
    id: Option<String>,

    /// Reservation TTL in seconds
    #[arg(long)]
    ttl: Option<i64>,

    /// Backup TS to protect (default: now)
    #[arg(long)]
    backup_ts: Option<u64>,

    /// GC safe point check period in seconds
    #[arg(long)]
    check_interval_secs: Option<u64>,

    /// Simulated GC worker period in seconds
    #[arg(long)]
    gc_tick_secs: Option<u64>,

    /// Simulated GC lifetime in seconds: GC targets `now - lifetime`
    #[arg(long)]
    gc_lifetime_secs: Option<u64>,

    /// Stop after this many seconds (0 = until Ctrl-C)
    #[arg(long)]
    run_secs: Option<u64>,
}

/// Simulation settings after merging CLI args > config file > defaults.
#[derive(Debug)]
struct SimulateSettings {
    safe_point: ServiceSafePoint,
    check_interval: Duration,
    gc_tick: Duration,
    gc_lifetime: chrono::Duration,
    run_for: Option<Duration>,
}

impl SimulateSettings {
    fn resolve(args: SimulateArgs, file_cfg: &KeeperConfigFile) -> anyhow::Result<Self> {
        let ttl = args
            .ttl
            .or(file_cfg.ttl)
            .unwrap_or(DEFAULT_BR_GC_SAFE_POINT_TTL);
        validate_ttl(ttl)?;

        let id = match args.id {
            Some(id) => {
                validate_safe_point_id(&id)?;
                id
            }
            None => make_safe_point_id(),
        };
        let backup_ts = args
            .backup_ts
            .unwrap_or_else(|| tso::ts_from_time(Utc::now()));

        let check_secs = args
            .check_interval_secs
            .or(file_cfg.check_interval_secs)
            .unwrap_or(CHECK_GC_SAFE_POINT_GAP.as_secs());
        let gc_tick_secs = args
            .gc_tick_secs
            .or(file_cfg.gc_tick_secs)
            .unwrap_or(DEFAULT_GC_TICK_SECS);
        if check_secs == 0 || gc_tick_secs == 0 {
            anyhow::bail!("check and GC periods must be positive");
        }
        let gc_lifetime_secs = args
            .gc_lifetime_secs
            .or(file_cfg.gc_lifetime_secs)
            .unwrap_or(DEFAULT_GC_LIFETIME_SECS);
        let run_secs = args
            .run_secs
            .or(file_cfg.run_secs)
            .unwrap_or(DEFAULT_SIMULATE_RUN_SECS);

        Ok(Self {
            safe_point: ServiceSafePoint::with_id(id, ttl, backup_ts),
            check_interval: Duration::from_secs(check_secs),
            gc_tick: Duration::from_secs(gc_tick_secs),
            gc_lifetime: chrono::Duration::seconds(gc_lifetime_secs as i64),
            run_for: (run_secs > 0).then(|| Duration::from_secs(run_secs)),
        })
    }
}

/// Terminates the process once the backup can no longer be trusted.
struct ExitProcess;

impl AbortHandler for ExitProcess {
    fn abort(&self, safe_point: &ServiceSafePoint, err: &SafePointError) {
        error!("Backup {} aborted: {}", safe_point.id, err);
        std::process::exit(EXIT_GC_EXCEEDED);
    }
}

/// One GC round towards `now - lifetime`.
async fn run_gc_round(pd: &MemoryPd, lifetime: chrono::Duration) -> u64 {
    let target = tso::ts_from_time(Utc::now() - lifetime);
    pd.run_gc(target).await
}

fn spawn_gc_worker(
    pd: MemoryPd,
    tick: Duration,
    lifetime: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("GC worker started (interval={}s)", tick.as_secs());
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    run_gc_round(&pd, lifetime).await;
                }
            }
        }
    })
}

async fn wait_for_stop(run_for: Option<Duration>) -> anyhow::Result<()> {
    match run_for {
        Some(limit) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res?,
                _ = tokio::time::sleep(limit) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

pub async fn run(args: SimulateArgs, file_cfg: &KeeperConfigFile) -> anyhow::Result<()> {
    let settings = SimulateSettings::resolve(args, file_cfg)?;
    info!("Starting simulated backup");
    info!("  Safe point:  {}", settings.safe_point);
    info!("  GC lifetime: {}s", settings.gc_lifetime.num_seconds());

    let pd = MemoryPd::new();
    // GC has been running long before this backup started.
    let gc_safe_point = run_gc_round(&pd, settings.gc_lifetime).await;
    info!("  GC safe point at start: {}", gc_safe_point);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gc_worker = spawn_gc_worker(
        pd.clone(),
        settings.gc_tick,
        settings.gc_lifetime,
        shutdown_rx.clone(),
    );

    let client: Arc<dyn PdClient> =
        Arc::new(TimeoutPd::new(pd.clone(), DEFAULT_PD_REQUEST_TIMEOUT));
    let mut keeper = ServiceSafePointKeeper::new(client, settings.safe_point)?
        .with_check_interval(settings.check_interval)
        .with_abort_handler(Arc::new(ExitProcess))
        .start(shutdown_rx)
        .await;

    tokio::select! {
        res = &mut keeper => {
            // Only reachable if the abort handler returned.
            let _ = shutdown_tx.send(true);
            gc_worker.await?;
            res??;
            anyhow::bail!("keeper stopped unexpectedly");
        }
        stop = wait_for_stop(settings.run_for) => {
            stop?;
            info!("Stopping keeper");
            let _ = shutdown_tx.send(true);
            keeper.await??;
        }
    }
    gc_worker.await?;

    let report = serde_json::json!({
        "gc_safe_point": pd.gc_safe_point().await,
        "service_safe_points": pd.service_safe_points().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
